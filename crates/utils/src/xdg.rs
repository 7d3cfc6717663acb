use std::env;
use std::path::PathBuf;

/// XDG Base Directory paths for ghostcache
pub struct XdgPaths;

impl XdgPaths {
    /// Get XDG_CONFIG_HOME/ghostcache or fallback
    pub fn config_dir() -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".config"))
                    .unwrap_or_else(|| PathBuf::from(".config"))
            })
            .join("ghostcache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_with_env() {
        let config_orig = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", "/tmp/config");

        assert_eq!(
            XdgPaths::config_dir(),
            PathBuf::from("/tmp/config/ghostcache")
        );

        match config_orig {
            Some(val) => env::set_var("XDG_CONFIG_HOME", val),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
    }

    #[test]
    #[serial]
    fn test_config_dir_falls_back_to_home() {
        let config_orig = env::var("XDG_CONFIG_HOME").ok();
        env::remove_var("XDG_CONFIG_HOME");

        assert!(XdgPaths::config_dir().ends_with(".config/ghostcache"));

        if let Some(val) = config_orig {
            env::set_var("XDG_CONFIG_HOME", val);
        }
    }
}
