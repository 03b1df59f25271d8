use std::io;
use std::path::Path;
use std::time::Duration;

/// Poll `connect` until it yields a resource.
///
/// There is no deadline: a resource that never shows up keeps the caller
/// here forever.
pub fn wait_for_resource<F, T, E>(mut connect: F, poll_interval_ms: u64, resource_name: &str) -> T
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    loop {
        match connect() {
            Ok(resource) => {
                tracing::info!("{} available", resource_name);
                return resource;
            }
            Err(e) => {
                tracing::debug!("Waiting for {} ({})", resource_name, e);
                std::thread::sleep(Duration::from_millis(poll_interval_ms));
            }
        }
    }
}

/// Block until `path` exists on the filesystem.
///
/// Used for endpoints another process provisions, such as the handshake FIFOs
/// created by the DUT runner.
pub fn wait_for_path(path: impl AsRef<Path>, poll_interval_ms: u64, resource_name: &str) {
    let path = path.as_ref();
    wait_for_resource(
        || {
            if path.exists() {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} does not exist yet", path.display()),
                ))
            }
        },
        poll_interval_ms,
        resource_name,
    )
}
