//! Key derivation: job type + identifier → store keys.
//!
//! Pure functions. Equal argument sequences always produce equal keys, which
//! is what makes two workers contend for the same lock.

use serde_json::Value;

const LOCK_PREFIX: &str = "lock";
const ADMISSION_PREFIX: &str = "admission";
const ARG_SEPARATOR: &str = "-";

/// Default identifier: each argument's natural string form joined with `-`.
///
/// Strings contribute their contents unquoted; every other JSON value
/// contributes its compact JSON text.
pub fn identifier(args: &[Value]) -> String {
    args.iter()
        .map(natural_string)
        .collect::<Vec<_>>()
        .join(ARG_SEPARATOR)
}

/// `lock:<job_type>:<identifier>`. An empty identifier keeps the trailing `:`.
pub fn lock_key(job_type: &str, identifier: &str) -> String {
    format!("{LOCK_PREFIX}:{job_type}:{identifier}")
}

/// `admission:` + the lock key.
pub fn admission_key(job_type: &str, identifier: &str) -> String {
    format!("{ADMISSION_PREFIX}:{}", lock_key(job_type, identifier))
}

fn natural_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
