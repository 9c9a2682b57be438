//! Built-in operations available on every host, used for smoke tests and
//! for exercising client timeouts.

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};

use crate::registry::OperationRegistry;

/// Upper bound for `sleep` so a typo cannot wedge the host thread.
const MAX_SLEEP_MILLIS: u64 = 60_000;

/// Register `ping`, `echo` and `sleep` on `registry`.
pub fn register_diagnostics<H: 'static>(registry: &mut OperationRegistry<H>) {
    registry
        .register_fn("ping", |_: &mut H, _| Ok(ping()))
        .register_fn("echo", |_: &mut H, params| Ok(echo(params)))
        .register_fn("sleep", |_: &mut H, params| sleep(params));
}

fn ping() -> Value {
    json!({ "status": "success", "message": "pong" })
}

fn echo(params: &Map<String, Value>) -> Value {
    json!({ "status": "success", "params": params })
}

fn sleep(params: &Map<String, Value>) -> Result<Value> {
    let millis = match params.get("millis") {
        None => 0,
        Some(value) => value
            .as_u64()
            .ok_or_else(|| anyhow!("'millis' must be a non-negative integer, got {value}"))?,
    };
    if millis > MAX_SLEEP_MILLIS {
        return Err(anyhow!("'millis' must not exceed {MAX_SLEEP_MILLIS}"));
    }
    std::thread::sleep(Duration::from_millis(millis));
    Ok(json!({ "status": "success", "slept_ms": millis }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OperationRegistry<()> {
        let mut registry = OperationRegistry::new();
        register_diagnostics(&mut registry);
        registry
    }

    #[test]
    fn registers_all_diagnostics() {
        assert_eq!(registry().names(), vec!["ping", "echo", "sleep"]);
    }

    #[test]
    fn ping_answers_pong() {
        let value = registry().execute(&mut (), "ping", &Map::new()).unwrap();
        assert_eq!(value["message"], "pong");
    }

    #[test]
    fn echo_returns_params() {
        let mut params = Map::new();
        params.insert("wall".into(), json!({ "height": 3.2 }));
        let value = registry().execute(&mut (), "echo", &params).unwrap();
        assert_eq!(value["params"]["wall"]["height"], 3.2);
    }

    #[test]
    fn sleep_validates_millis() {
        let mut params = Map::new();
        params.insert("millis".into(), json!("soon"));
        let error = registry().execute(&mut (), "sleep", &params).unwrap_err();
        assert!(error.to_string().contains("non-negative integer"));

        params.insert("millis".into(), json!(5));
        let value = registry().execute(&mut (), "sleep", &params).unwrap();
        assert_eq!(value["slept_ms"], 5);
    }
}
