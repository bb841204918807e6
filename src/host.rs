use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::OnceLock;

/// Stable per-process host identifier, used for key splitting.
///
/// Hashed from the host name, so logically identical requests map to the same
/// split key for the lifetime of the host without cross-host coordination.
/// Routes take this as their default; tests override it through the route
/// builder instead.
pub fn host_id() -> u64 {
    static HOST_ID: OnceLock<u64> = OnceLock::new();
    *HOST_ID.get_or_init(|| {
        let mut hasher = DefaultHasher::new();
        host_name().hash(&mut hasher);
        hasher.finish()
    })
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| {
            #[cfg(unix)]
            {
                use std::process::Command;
                Command::new("hostname")
                    .output()
                    .ok()
                    .and_then(|out| String::from_utf8(out.stdout).ok())
                    .map(|name| name.trim().to_string())
                    .unwrap_or_else(|| "localhost".to_string())
            }
            #[cfg(not(unix))]
            {
                "localhost".to_string()
            }
        })
}
