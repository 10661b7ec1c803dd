//! Node identity parsing.
//!
//! Agent VMs follow one of two naming families:
//!
//! ```text
//! Linux    k8s-{pool}-{suffix:8 hex}-{index}         k8s-agentpool1-1a2b3c4d-3
//! Windows  {suffix:4 hex}{orch:3}{slot:2}{index}     1a2bk8s01012
//! Windows  {suffix:5 hex}{orch:3}9{slot:2}{index}    38988k8s90312  (legacy)
//! ```
//!
//! Nothing in the name itself says which family applies, so the caller
//! passes the image publisher and a case-insensitive match against the
//! Windows Server publisher selects the Windows parser.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityResult};
use crate::model::OsFlavor;

/// Image publisher of Windows Server agent images.
pub const WINDOWS_PUBLISHER: &str = "MicrosoftWindowsServer";

const LINUX_PATTERN: &str = r"^[0-9a-zA-Z]{3}-(.+)-([0-9a-fA-F]{8})-{0,2}([0-9]+)$";
const WINDOWS_PATTERN: &str = r"^([a-fA-F0-9]{4})([0-9a-zA-Z]{3})([0-9]{3,8})$";
const WINDOWS_LEGACY_PATTERN: &str = r"^([a-fA-F0-9]{5})([0-9a-zA-Z]{3})(9)([a-zA-Z0-9]{3,5})$";

/// Structured identity of an agent VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Pool name for Linux names, orchestrator tag (`k8s`) for Windows names.
    pub pool_fragment: String,
    /// The (possibly truncated) cluster name suffix embedded in the name.
    pub suffix_fragment: String,
    pub index: u32,
    pub os: OsFlavor,
    /// Windows only: the pool slot encoded ahead of the node index.
    pub pool_slot: Option<u32>,
}

/// Compiled name patterns. Build once per scan.
#[derive(Debug, Clone)]
pub struct NameParser {
    linux: Regex,
    windows: Regex,
    windows_legacy: Regex,
    windows_publisher: String,
}

impl NameParser {
    pub fn new() -> IdentityResult<Self> {
        Self::with_windows_publisher(WINDOWS_PUBLISHER)
    }

    /// Use a different publisher marker for Windows images.
    pub fn with_windows_publisher(publisher: &str) -> IdentityResult<Self> {
        Ok(Self {
            linux: Regex::new(LINUX_PATTERN)?,
            windows: Regex::new(WINDOWS_PATTERN)?,
            windows_legacy: Regex::new(WINDOWS_LEGACY_PATTERN)?,
            windows_publisher: publisher.to_string(),
        })
    }

    /// Whether an image publisher marks a Windows node.
    pub fn is_windows_publisher(&self, publisher: Option<&str>) -> bool {
        publisher.is_some_and(|p| p.eq_ignore_ascii_case(&self.windows_publisher))
    }

    /// Parse a VM name, picking the naming family from the image publisher.
    pub fn parse(&self, vm_name: &str, publisher: Option<&str>) -> IdentityResult<NodeIdentity> {
        if self.is_windows_publisher(publisher) {
            self.parse_windows(vm_name)
        } else {
            self.parse_linux(vm_name)
        }
    }

    pub fn parse_linux(&self, vm_name: &str) -> IdentityResult<NodeIdentity> {
        let caps = self
            .linux
            .captures(vm_name)
            .ok_or_else(|| unparseable(vm_name, "does not match the Linux naming scheme"))?;

        Ok(NodeIdentity {
            pool_fragment: caps[1].to_string(),
            suffix_fragment: caps[2].to_string(),
            index: parse_number(vm_name, &caps[3])?,
            os: OsFlavor::Linux,
            pool_slot: None,
        })
    }

    pub fn parse_windows(&self, vm_name: &str) -> IdentityResult<NodeIdentity> {
        let (prefix, orch, pool_info) = if let Some(caps) = self.windows.captures(vm_name) {
            (caps[1].to_string(), caps[2].to_string(), caps[3].to_string())
        } else if let Some(caps) = self.windows_legacy.captures(vm_name) {
            (caps[1].to_string(), caps[2].to_string(), caps[4].to_string())
        } else {
            return Err(unparseable(vm_name, "does not match the Windows naming scheme"));
        };

        // Two digits of pool slot, then the node index.
        let (slot, index) = pool_info.split_at(2);

        Ok(NodeIdentity {
            pool_fragment: orch,
            suffix_fragment: prefix,
            index: parse_number(vm_name, index)?,
            os: OsFlavor::Windows,
            pool_slot: Some(parse_number(vm_name, slot)?),
        })
    }
}

fn parse_number(vm_name: &str, digits: &str) -> IdentityResult<u32> {
    digits
        .parse::<u32>()
        .map_err(|e| unparseable(vm_name, &format!("bad numeric part {digits:?}: {e}")))
}

fn unparseable(vm_name: &str, reason: &str) -> IdentityError {
    IdentityError::Unparseable {
        name: vm_name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> NameParser {
        NameParser::new().unwrap()
    }

    #[test]
    fn linux_name_parts() {
        let id = parser().parse("k8s-agentpool1-1a2b3c4d-3", None).unwrap();
        assert_eq!(id.pool_fragment, "agentpool1");
        assert_eq!(id.suffix_fragment, "1a2b3c4d");
        assert_eq!(id.index, 3);
        assert_eq!(id.os, OsFlavor::Linux);
        assert_eq!(id.pool_slot, None);
    }

    #[test]
    fn linux_pool_name_with_dashes() {
        let id = parser().parse("k8s-gpu-pool-12345678-10", None).unwrap();
        assert_eq!(id.pool_fragment, "gpu-pool");
        assert_eq!(id.index, 10);
    }

    #[test]
    fn windows_name_parts() {
        let id = parser()
            .parse("1a2bk8s01012", Some("MicrosoftWindowsServer"))
            .unwrap();
        assert_eq!(id.suffix_fragment, "1a2b");
        assert_eq!(id.pool_fragment, "k8s");
        assert_eq!(id.pool_slot, Some(1));
        assert_eq!(id.index, 12);
        assert_eq!(id.os, OsFlavor::Windows);
    }

    #[test]
    fn windows_legacy_name_parts() {
        let id = parser()
            .parse("38988k8s90312", Some("microsoftwindowsserver"))
            .unwrap();
        assert_eq!(id.suffix_fragment, "38988");
        assert_eq!(id.pool_slot, Some(3));
        assert_eq!(id.index, 12);
    }

    #[test]
    fn publisher_selects_family() {
        // A Linux-shaped name under a Windows publisher is not accepted.
        let err = parser()
            .parse("k8s-agentpool1-1a2b3c4d-3", Some("MicrosoftWindowsServer"))
            .unwrap_err();
        assert!(matches!(err, IdentityError::Unparseable { .. }));

        assert!(parser().parse("k8s-agentpool1-1a2b3c4d-3", Some("Canonical")).is_ok());
    }

    #[test]
    fn malformed_names_fail() {
        let p = parser();
        assert!(p.parse("k8s-master-1a2b3c4d", None).is_err());
        assert!(p.parse("jumpbox", None).is_err());
        assert!(p.parse("k8s-pool-1a2b3c4d-99999999999", None).is_err());
        assert!(p.parse("zzzzk8s010", Some(WINDOWS_PUBLISHER)).is_err());
    }

    #[test]
    fn custom_publisher_marker() {
        let p = NameParser::with_windows_publisher("ContosoWindows").unwrap();
        assert!(p.is_windows_publisher(Some("contosowindows")));
        assert!(!p.is_windows_publisher(Some(WINDOWS_PUBLISHER)));
        assert!(!p.is_windows_publisher(None));
    }
}
