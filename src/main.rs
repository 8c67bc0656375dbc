use log::{error, info};
use nanokv::{Handle, NanokvConfig, Value};

/// A small runnable demo exercising `nanokv::Handle` end to end: load
/// config, open the database, run a few operations, log the results.
fn main() {
    env_logger::init();

    let config = match NanokvConfig::from_file("Nanokv.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("failed to read Nanokv.toml: {e}");
            return;
        }
    };

    let handle = match Handle::open(config) {
        Ok(handle) => handle,
        Err(e) => {
            error!("failed to open database: {e}");
            return;
        }
    };

    let user = Value::from_serializable(&serde_json::json!({
        "name": "John Doe",
        "email": "john.doe@example.com",
    }))
    .expect("a JSON object always serializes");

    if let Err(e) = handle.set("user:1", user) {
        error!("failed to write user:1: {e}");
        return;
    }

    match handle.get("user:1") {
        Ok(Some(value)) => info!("retrieved user:1: {value:?}"),
        Ok(None) => info!("user:1 not found"),
        Err(e) => error!("failed to read user:1: {e}"),
    }

    if let Err(e) = handle.delete("user:1") {
        error!("failed to delete user:1: {e}");
        return;
    }

    handle.close();
    info!("all operations completed successfully");
}
