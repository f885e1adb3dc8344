//! OS detection from boot disk images
//!
//! Public images encode the distribution in their name
//! (`ubuntu-2204-jammy-v20240112`, `debian-11-bullseye-arm64-v20231010`,
//! `windows-server-2022-dc-v20240111`). The boot disk's `guestOsFeatures`
//! refine the result.

use crate::resource::fields::{self, NOT_AVAILABLE};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static RE_UBUNTU_RELEASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})(\d{2})").unwrap());

static RE_DEBIAN_RELEASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"debian-(\d+)").unwrap());

static RE_CENTOS_RELEASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"centos-(\d+)").unwrap());

static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})").unwrap());

static RE_FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());

/// Operating system columns of an inventory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub family: String,
    pub version: String,
    pub architecture: String,
    pub image: String,
}

impl Default for OsInfo {
    fn default() -> Self {
        Self {
            family: NOT_AVAILABLE.to_string(),
            version: NOT_AVAILABLE.to_string(),
            architecture: NOT_AVAILABLE.to_string(),
            image: NOT_AVAILABLE.to_string(),
        }
    }
}

/// Derive OS columns from a `disks describe` payload of the boot disk
pub fn os_from_boot_disk(disk: &Value) -> OsInfo {
    let mut info = OsInfo::default();

    if let Some(source_image) = fields::lookup(disk, "sourceImage").and_then(Value::as_str) {
        if !source_image.is_empty() {
            let image = fields::short_name(source_image);
            info.image = image.to_string();
            let parsed = parse_image_name(&image.to_lowercase());
            info.family = parsed.family;
            info.version = parsed.version;
            info.architecture = parsed.architecture;
        }
    }

    if let Some(features) = fields::lookup(disk, "guestOsFeatures").and_then(Value::as_array) {
        for feature in features {
            let kind = fields::text_or(feature, "type", "").to_lowercase();
            if kind.contains("windows") {
                if info.family == NOT_AVAILABLE {
                    info.family = "Windows".to_string();
                }
            } else if kind.contains("uefi") {
                info.architecture = "UEFI".to_string();
            }
        }
    }

    info
}

/// Family, version and architecture guessed from a lowercase image name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOs {
    pub family: String,
    pub version: String,
    pub architecture: String,
}

pub fn parse_image_name(image_name: &str) -> ImageOs {
    let has = |needle: &str| image_name.contains(needle);
    let capture = |re: &Regex| {
        re.captures(image_name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };

    let (family, version): (&str, Option<String>) = if has("ubuntu") {
        let version = if has("2004") || has("focal") {
            Some("20.04 LTS (Focal)".to_string())
        } else if has("2204") || has("jammy") {
            Some("22.04 LTS (Jammy)".to_string())
        } else if has("1804") || has("bionic") {
            Some("18.04 LTS (Bionic)".to_string())
        } else if has("1604") || has("xenial") {
            Some("16.04 LTS (Xenial)".to_string())
        } else {
            RE_UBUNTU_RELEASE
                .captures(image_name)
                .map(|c| format!("{}.{}", &c[1], &c[2]))
        };
        ("Ubuntu", version)
    } else if has("debian") {
        let version = if has("debian-11") || has("bullseye") {
            Some("11 (Bullseye)".to_string())
        } else if has("debian-10") || has("buster") {
            Some("10 (Buster)".to_string())
        } else if has("debian-9") || has("stretch") {
            Some("9 (Stretch)".to_string())
        } else {
            capture(&RE_DEBIAN_RELEASE)
        };
        ("Debian", version)
    } else if has("centos") {
        let version = if has("centos-7") {
            Some("7".to_string())
        } else if has("centos-8") {
            Some("8".to_string())
        } else if has("centos-stream") {
            Some("Stream".to_string())
        } else {
            capture(&RE_CENTOS_RELEASE)
        };
        ("CentOS", version)
    } else if has("rhel") || has("red-hat") {
        ("Red Hat Enterprise Linux", capture(&RE_FIRST_NUMBER))
    } else if has("windows") {
        let version = ["2019", "2016", "2012", "2022"]
            .into_iter()
            .find(|year| has(year))
            .map(str::to_string)
            .or_else(|| capture(&RE_YEAR));
        ("Windows Server", version)
    } else if has("suse") || has("sles") {
        ("SUSE Linux Enterprise Server", capture(&RE_FIRST_NUMBER))
    } else if has("fedora") {
        ("Fedora", capture(&RE_FIRST_NUMBER))
    } else if has("rocky") {
        ("Rocky Linux", capture(&RE_FIRST_NUMBER))
    } else if has("alma") {
        ("AlmaLinux", capture(&RE_FIRST_NUMBER))
    } else if has("cos") || has("container-optimized") {
        ("Container-Optimized OS", capture(&RE_FIRST_NUMBER))
    } else {
        (NOT_AVAILABLE, None)
    };

    let architecture = if has("arm64") || has("aarch64") {
        "ARM64"
    } else if has("arm") {
        "ARM"
    } else {
        "x86_64"
    };

    ImageOs {
        family: family.to_string(),
        version: version.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        architecture: architecture.to_string(),
    }
}
