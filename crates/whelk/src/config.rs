//! Static description of the emulated machine.

use serde::{Deserialize, Serialize};

/// Identity of the emulated system, as reported by `uname`, `hostname` and
/// the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemConfig {
    /// Distribution name, e.g. `Ubuntu`.
    pub distribution_name: String,
    /// Distribution version, e.g. `24.04 LTS`.
    pub distribution_version: String,
    /// Host name shown in the prompt.
    pub host_name: String,
    /// `uname -s`
    pub kernel_name: String,
    /// `uname -r`
    pub kernel_release: String,
    /// `uname -v`
    pub kernel_version: String,
    /// `uname -m`
    pub machine: String,
    /// `uname -o`
    pub operating_system: String,
    /// Login shell path for every account.
    pub shell_path: String,
    /// Command line of pid 1.
    pub init_path: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            distribution_name: "Ubuntu".to_string(),
            distribution_version: "24.04 LTS".to_string(),
            host_name: "ubuntu".to_string(),
            kernel_name: "Linux".to_string(),
            kernel_release: "3.48".to_string(),
            kernel_version: "#1 SMP PREEMPT".to_string(),
            machine: "x86_64".to_string(),
            operating_system: "GNU/Linux".to_string(),
            shell_path: "/bin/bash".to_string(),
            init_path: "/sbin/init".to_string(),
        }
    }
}

impl SystemConfig {
    /// `Ubuntu 24.04 LTS`
    pub fn pretty_name(&self) -> String {
        format!("{} {}", self.distribution_name, self.distribution_version)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SystemConfig::default();
        assert_eq!(config.host_name, "ubuntu");
        assert_eq!(config.shell_path, "/bin/bash");
        assert_eq!(config.pretty_name(), "Ubuntu 24.04 LTS");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SystemConfig =
            serde_json::from_str(r#"{"hostName": "lab", "machine": "aarch64"}"#).unwrap();
        assert_eq!(config.host_name, "lab");
        assert_eq!(config.machine, "aarch64");
        assert_eq!(config.init_path, "/sbin/init");
    }

    #[test]
    fn test_serialization_format() {
        let json = serde_json::to_string(&SystemConfig::default()).unwrap();
        assert!(json.contains("\"hostName\":\"ubuntu\""));
        assert!(json.contains("\"kernelRelease\":\"3.48\""));
    }
}
