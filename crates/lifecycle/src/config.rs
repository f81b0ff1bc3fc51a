//! Lifecycle configuration
//!
//! Everything the engines need is loaded once at startup, environment-driven
//! the same way the service binaries configure themselves. Missing required
//! settings are a `Configuration` error and abort startup.

use crate::error::LifecycleError;
use ledger::{AddressType, InstallPhase};
use std::collections::BTreeMap;
use std::env;
use std::net::Ipv4Addr;
use std::time::Duration;

/// One scannable address range inside a provider subnet
#[derive(Debug, Clone)]
pub struct AddressRange {
    /// Provider subnet id reservations are made against
    pub subnet_id: String,
    /// Network base address offsets are added to
    pub base: Ipv4Addr,
    /// First offset to try, inclusive
    pub first_offset: u32,
    /// Last offset to try, inclusive
    pub last_offset: u32,
}

impl AddressRange {
    /// The address at a given offset from the base
    pub fn address_at(&self, offset: u32) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.base).wrapping_add(offset))
    }

    /// Ascending offsets to scan
    pub fn offsets(&self) -> std::ops::RangeInclusive<u32> {
        self.first_offset..=self.last_offset
    }

    /// Parse "base,first,last" (e.g. "10.0.0.0,10,250")
    fn parse(raw: &str, key: &str) -> Result<(Ipv4Addr, u32, u32), LifecycleError> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(LifecycleError::Configuration(format!(
                "{} must be \"base,first_offset,last_offset\", got \"{}\"",
                key, raw
            )));
        }
        let base: Ipv4Addr = parts[0].parse().map_err(|_| {
            LifecycleError::Configuration(format!("{}: invalid base address \"{}\"", key, parts[0]))
        })?;
        let first: u32 = parts[1].parse().map_err(|_| {
            LifecycleError::Configuration(format!("{}: invalid first offset \"{}\"", key, parts[1]))
        })?;
        let last: u32 = parts[2].parse().map_err(|_| {
            LifecycleError::Configuration(format!("{}: invalid last offset \"{}\"", key, parts[2]))
        })?;
        if first > last {
            return Err(LifecycleError::Configuration(format!(
                "{}: first offset {} exceeds last offset {}",
                key, first, last
            )));
        }
        Ok((base, first, last))
    }
}

/// Per-phase installer timeout budgets
#[derive(Debug, Clone)]
pub struct PhaseTimeouts {
    budgets: BTreeMap<InstallPhase, Duration>,
}

impl PhaseTimeouts {
    /// Default budgets in minutes, tuned to observed installer behavior
    const DEFAULTS: [(InstallPhase, u64); 9] = [
        (InstallPhase::IpxeBoot, 10),
        (InstallPhase::ConfigDownload, 5),
        (InstallPhase::FoundationStart, 10),
        (InstallPhase::StorageDiscovery, 10),
        (InstallPhase::ImageDownload, 30),
        (InstallPhase::Installation, 45),
        (InstallPhase::ClusterFormation, 30),
        (InstallPhase::DnsRegistration, 5),
        (InstallPhase::HealthValidation, 10),
    ];

    /// Build from explicit per-phase budgets
    pub fn new(budgets: BTreeMap<InstallPhase, Duration>) -> Self {
        Self { budgets }
    }

    fn defaults() -> Self {
        Self {
            budgets: Self::DEFAULTS
                .iter()
                .map(|(p, mins)| (*p, Duration::from_secs(mins * 60)))
                .collect(),
        }
    }

    /// Budget for one phase
    pub fn budget(&self, phase: InstallPhase) -> Duration {
        self.budgets.get(&phase).copied().unwrap_or(Duration::ZERO)
    }

    /// Sum of the budgets of phases strictly before `phase`
    pub fn before(&self, phase: InstallPhase) -> Duration {
        InstallPhase::ALL
            .iter()
            .take(phase.position())
            .map(|p| self.budget(*p))
            .sum()
    }

    /// Sum of all budgets; the deployment's total time allowance
    pub fn total(&self) -> Duration {
        InstallPhase::ALL.iter().map(|p| self.budget(*p)).sum()
    }
}

/// Cluster formation polling knobs
#[derive(Debug, Clone)]
pub struct FormationConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Complete lifecycle configuration
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Scannable range per address type; all five types must be present
    pub ranges: BTreeMap<AddressType, AddressRange>,
    /// DNS zone records are registered in
    pub dns_zone: String,
    /// Fixed cluster name, registered by the founding node
    pub cluster_name: String,
    /// Boot image every bare-metal server launches with
    pub boot_image_id: String,
    /// Callback address handed to the installer in bootstrap user data
    pub callback_url: String,
    /// Security policies applied to the management interface
    pub management_policy_ids: Vec<String>,
    /// Security policies applied to the workload interface
    pub workload_policy_ids: Vec<String>,
    pub phase_timeouts: PhaseTimeouts,
    pub formation: FormationConfig,
}

impl LifecycleConfig {
    /// Range for an address type
    pub fn range(&self, address_type: AddressType) -> Result<&AddressRange, LifecycleError> {
        self.ranges.get(&address_type).ok_or_else(|| {
            LifecycleError::Configuration(format!(
                "no address range configured for type {}",
                address_type
            ))
        })
    }

    /// Load from environment variables.
    ///
    /// Required: `HCI_RANGE_<TYPE>` ("base,first,last") and
    /// `HCI_SUBNET_<TYPE>` for management/ahv/cvm/workload/cluster,
    /// `HCI_DNS_ZONE`, `HCI_BOOT_IMAGE`, `HCI_CALLBACK_URL`.
    /// Optional: `HCI_CLUSTER_NAME` (default "cluster01"),
    /// `HCI_MGMT_POLICIES` / `HCI_WORKLOAD_POLICIES` (comma lists),
    /// `HCI_PHASE_TIMEOUT_<PHASE>_MINS`, `HCI_FORMATION_POLL_SECS`,
    /// `HCI_FORMATION_TIMEOUT_MINS`.
    pub fn from_env() -> Result<Self, LifecycleError> {
        let mut ranges = BTreeMap::new();
        for address_type in [
            AddressType::Management,
            AddressType::Ahv,
            AddressType::Cvm,
            AddressType::Workload,
            AddressType::Cluster,
        ] {
            let upper = address_type.as_str().to_uppercase();
            let range_key = format!("HCI_RANGE_{}", upper);
            let subnet_key = format!("HCI_SUBNET_{}", upper);
            let raw = required(&range_key)?;
            let (base, first_offset, last_offset) = AddressRange::parse(&raw, &range_key)?;
            ranges.insert(
                address_type,
                AddressRange {
                    subnet_id: required(&subnet_key)?,
                    base,
                    first_offset,
                    last_offset,
                },
            );
        }

        let mut phase_timeouts = PhaseTimeouts::defaults();
        for phase in InstallPhase::ALL {
            let key = format!("HCI_PHASE_TIMEOUT_{}_MINS", phase.as_str().to_uppercase());
            if let Ok(raw) = env::var(&key) {
                let mins: u64 = raw.parse().map_err(|_| {
                    LifecycleError::Configuration(format!("{}: invalid minutes \"{}\"", key, raw))
                })?;
                phase_timeouts
                    .budgets
                    .insert(phase, Duration::from_secs(mins * 60));
            }
        }

        Ok(Self {
            ranges,
            dns_zone: required("HCI_DNS_ZONE")?,
            cluster_name: env::var("HCI_CLUSTER_NAME").unwrap_or_else(|_| "cluster01".to_string()),
            boot_image_id: required("HCI_BOOT_IMAGE")?,
            callback_url: required("HCI_CALLBACK_URL")?,
            management_policy_ids: id_list("HCI_MGMT_POLICIES"),
            workload_policy_ids: id_list("HCI_WORKLOAD_POLICIES"),
            phase_timeouts,
            formation: FormationConfig {
                poll_interval: Duration::from_secs(parsed_or("HCI_FORMATION_POLL_SECS", 30)?),
                timeout: Duration::from_secs(parsed_or("HCI_FORMATION_TIMEOUT_MINS", 60)? * 60),
            },
        })
    }
}

fn required(key: &str) -> Result<String, LifecycleError> {
    env::var(key).map_err(|_| {
        LifecycleError::Configuration(format!("{} environment variable is required", key))
    })
}

fn id_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parsed_or(key: &str, default: u64) -> Result<u64, LifecycleError> {
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| {
            LifecycleError::Configuration(format!("{}: invalid value \"{}\"", key, raw))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;

    /// A config over 10.0.0.0/24-style ranges for unit tests
    pub fn test_config() -> LifecycleConfig {
        let range = |subnet: &str, first, last| AddressRange {
            subnet_id: subnet.to_string(),
            base: Ipv4Addr::new(10, 0, 0, 0),
            first_offset: first,
            last_offset: last,
        };
        let mut ranges = BTreeMap::new();
        ranges.insert(AddressType::Management, range("subnet-mgmt", 10, 60));
        ranges.insert(AddressType::Ahv, range("subnet-mgmt", 10, 60));
        ranges.insert(AddressType::Cvm, range("subnet-mgmt", 10, 60));
        ranges.insert(AddressType::Workload, range("subnet-mgmt", 10, 60));
        ranges.insert(AddressType::Cluster, range("subnet-mgmt", 200, 210));
        LifecycleConfig {
            ranges,
            dns_zone: "hci.internal".to_string(),
            cluster_name: "cluster01".to_string(),
            boot_image_id: "img-foundation".to_string(),
            callback_url: "http://provisiond.hci.internal/v1/phase-reports".to_string(),
            management_policy_ids: vec!["nsg-mgmt".to_string(), "nsg-intra".to_string()],
            workload_policy_ids: vec!["nsg-wkld".to_string()],
            phase_timeouts: PhaseTimeouts::defaults(),
            formation: FormationConfig {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_millis(100),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_budget_sums_are_ordered() {
        let timeouts = PhaseTimeouts::defaults();
        assert_eq!(timeouts.before(InstallPhase::IpxeBoot), Duration::ZERO);
        assert_eq!(
            timeouts.before(InstallPhase::ConfigDownload),
            timeouts.budget(InstallPhase::IpxeBoot)
        );
        assert_eq!(
            timeouts.total(),
            timeouts.before(InstallPhase::HealthValidation)
                + timeouts.budget(InstallPhase::HealthValidation)
        );
    }

    #[test]
    fn range_parse_rejects_malformed_input() {
        assert!(AddressRange::parse("10.0.0.0,10,250", "K").is_ok());
        assert!(AddressRange::parse("10.0.0.0,250,10", "K").is_err());
        assert!(AddressRange::parse("10.0.0.0,10", "K").is_err());
        assert!(AddressRange::parse("not-an-ip,10,250", "K").is_err());
    }

    #[test]
    fn address_at_adds_offset_to_base() {
        let range = AddressRange {
            subnet_id: "subnet-mgmt".to_string(),
            base: Ipv4Addr::new(10, 0, 0, 0),
            first_offset: 10,
            last_offset: 250,
        };
        assert_eq!(range.address_at(10), Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(range.address_at(200), Ipv4Addr::new(10, 0, 0, 200));
    }
}
