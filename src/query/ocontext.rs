//! Queries over labeling statements.
//!
//! Every query here also implements [`ContextQuery`](super::ContextQuery), so the user, role,
//! type and range of the statement's context can be narrowed with the
//! shared setters.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv6Addr;

use tracing::{debug, info};

use crate::error::{PolicyError, Result};
use crate::policy::{
    Devicetreecon, FileType, FsUse, FsUseRuletype, Genfscon, Ibendportcon, Ibpkeycon,
    InitialSid, Iomemcon, Ioportcon, IpNetwork, IpVersion, Netifcon, Nodecon, NumRange,
    Pcidevicecon, Pirqcon, Policy, Portcon, PortconProtocol,
};

use super::criteria::{impl_context_query, ContextCriteria};
use super::matching::{Criterion, RangeMatch};

/// Validated numeric range criterion.
fn num_range<T: PartialOrd + Copy + fmt::Display>(
    low: T,
    high: T,
    mode: RangeMatch,
) -> Result<(NumRange<T>, RangeMatch)> {
    Ok((NumRange::new(low, high)?, mode))
}

fn match_num_range<T: PartialOrd>(obj: &NumRange<T>, criterion: &Option<(NumRange<T>, RangeMatch)>) -> bool {
    criterion
        .as_ref()
        .map_or(true, |(range, mode)| mode.matches(obj, range))
}

fn match_name(name: &str, criterion: &Option<Criterion<String>>) -> bool {
    match criterion {
        None => true,
        Some(Criterion::Exact(c)) => c == name,
        Some(Criterion::Regex(r)) => r.is_match(name),
    }
}

// =============================================================================
// INITIAL SIDS
// =============================================================================

/// Query initial SIDs by name and context.
#[derive(Debug, Clone)]
pub struct InitialSidQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<String>>,
    context: ContextCriteria,
}

impl<'p> InitialSidQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Result<Self> {
        self.name = Some(Criterion::Exact(
            self.policy.lookup_initialsid(name)?.name.clone(),
        ));
        Ok(self)
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// SIDs without a context only match when no context criteria are set.
    pub fn results(&self) -> impl Iterator<Item = &'p InitialSid> + '_ {
        info!("Generating initial SID results from {}", self.policy);
        debug!("Name: {:?}, context: {:?}", self.name, self.context);
        self.policy.initialsids().filter(move |s| {
            match_name(&s.name, &self.name)
                && self
                    .context
                    .matches_optional(self.policy, s.context.as_ref())
        })
    }
}

// =============================================================================
// NETWORK CONTEXTS
// =============================================================================

/// Query portcon statements by protocol and port range.
#[derive(Debug, Clone)]
pub struct PortconQuery<'p> {
    policy: &'p Policy,
    protocol: Option<PortconProtocol>,
    ports: Option<(NumRange<u16>, RangeMatch)>,
    context: ContextCriteria,
}

impl<'p> PortconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            protocol: None,
            ports: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: PortconProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Port range, compared with `mode`. Fails when `low > high`.
    pub fn with_ports(mut self, low: u16, high: u16, mode: RangeMatch) -> Result<Self> {
        self.ports = Some(num_range(low, high, mode)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Portcon> + '_ {
        info!("Generating portcon results from {}", self.policy);
        debug!(
            "Protocol: {:?}, ports: {:?}, context: {:?}",
            self.protocol, self.ports, self.context
        );
        self.policy.portcons().filter(move |p| {
            self.protocol.map_or(true, |proto| p.protocol == proto)
                && match_num_range(&p.ports, &self.ports)
                && self.context.matches(self.policy, &p.context)
        })
    }
}

/// Query netifcon statements by interface name.
#[derive(Debug, Clone)]
pub struct NetifconQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<String>>,
    context: ContextCriteria,
}

impl<'p> NetifconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Criterion::Exact(name.to_string()));
        self
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Netifcon> + '_ {
        info!("Generating netifcon results from {}", self.policy);
        debug!("Name: {:?}, context: {:?}", self.name, self.context);
        self.policy.netifcons().filter(move |n| {
            match_name(&n.netif, &self.name)
                && self.context.matches(self.policy, &n.context)
        })
    }
}

/// Query nodecon statements by network and IP version.
#[derive(Debug, Clone)]
pub struct NodeconQuery<'p> {
    policy: &'p Policy,
    network: Option<IpNetwork>,
    network_overlap: bool,
    ip_version: Option<IpVersion>,
    context: ContextCriteria,
}

impl<'p> NodeconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            network: None,
            network_overlap: false,
            ip_version: None,
            context: ContextCriteria::default(),
        }
    }

    /// Network in CIDR notation, e.g. `192.168.0.0/16`.
    pub fn with_network(mut self, network: &str) -> Result<Self> {
        self.network = Some(network.parse()?);
        Ok(self)
    }

    /// Match any statement whose network contains or is contained by the
    /// criterion, instead of requiring equality.
    pub fn with_network_overlap(mut self, overlap: bool) -> Self {
        self.network_overlap = overlap;
        self
    }

    pub fn with_ip_version(mut self, version: IpVersion) -> Self {
        self.ip_version = Some(version);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Nodecon> + '_ {
        info!("Generating nodecon results from {}", self.policy);
        debug!(
            "Network: {:?} (overlap: {}), version: {:?}, context: {:?}",
            self.network, self.network_overlap, self.ip_version, self.context
        );
        self.policy.nodecons().filter(move |n| {
            self.network.map_or(true, |net| {
                if self.network_overlap {
                    n.network.overlaps(&net)
                } else {
                    n.network == net
                }
            }) && self.ip_version.map_or(true, |v| n.ip_version() == v)
                && self.context.matches(self.policy, &n.context)
        })
    }
}

/// Query InfiniBand pkey contexts.
#[derive(Debug, Clone)]
pub struct IbpkeyconQuery<'p> {
    policy: &'p Policy,
    subnet_prefix: Option<Ipv6Addr>,
    pkeys: Option<(NumRange<u16>, RangeMatch)>,
    context: ContextCriteria,
}

impl<'p> IbpkeyconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            subnet_prefix: None,
            pkeys: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_subnet_prefix(mut self, prefix: &str) -> Result<Self> {
        let prefix = prefix.parse().map_err(|_| {
            PolicyError::InvalidValue(format!("{} is not a valid subnet prefix", prefix))
        })?;
        self.subnet_prefix = Some(prefix);
        Ok(self)
    }

    pub fn with_pkeys(mut self, low: u16, high: u16, mode: RangeMatch) -> Result<Self> {
        self.pkeys = Some(num_range(low, high, mode)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Ibpkeycon> + '_ {
        info!("Generating ibpkeycon results from {}", self.policy);
        debug!(
            "Subnet prefix: {:?}, pkeys: {:?}, context: {:?}",
            self.subnet_prefix, self.pkeys, self.context
        );
        self.policy.ibpkeycons().filter(move |k| {
            self.subnet_prefix.map_or(true, |p| k.subnet_prefix == p)
                && match_num_range(&k.pkeys, &self.pkeys)
                && self.context.matches(self.policy, &k.context)
        })
    }
}

/// Query InfiniBand end port contexts.
#[derive(Debug, Clone)]
pub struct IbendportconQuery<'p> {
    policy: &'p Policy,
    name: Option<Criterion<String>>,
    port: Option<u8>,
    context: ContextCriteria,
}

impl<'p> IbendportconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            name: None,
            port: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(Criterion::Exact(name.to_string()));
        self
    }

    pub fn with_name_regex(mut self, pattern: &str) -> Result<Self> {
        self.name = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// End ports are 1-255.
    pub fn with_port(mut self, port: u8) -> Result<Self> {
        if port == 0 {
            return Err(PolicyError::InvalidValue(
                "endport must be 1-255".to_string(),
            ));
        }
        self.port = Some(port);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Ibendportcon> + '_ {
        info!("Generating ibendportcon results from {}", self.policy);
        debug!(
            "Name: {:?}, port: {:?}, context: {:?}",
            self.name, self.port, self.context
        );
        self.policy.ibendportcons().filter(move |e| {
            match_name(&e.name, &self.name)
                && self.port.map_or(true, |p| e.port == p)
                && self.context.matches(self.policy, &e.context)
        })
    }
}

// =============================================================================
// FILESYSTEM CONTEXTS
// =============================================================================

/// Query fs_use_* statements.
#[derive(Debug, Clone)]
pub struct FsUseQuery<'p> {
    policy: &'p Policy,
    ruletypes: BTreeSet<FsUseRuletype>,
    fs: Option<Criterion<String>>,
    context: ContextCriteria,
}

impl<'p> FsUseQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ruletypes: BTreeSet::new(),
            fs: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_ruletypes(mut self, ruletypes: impl IntoIterator<Item = FsUseRuletype>) -> Self {
        self.ruletypes = ruletypes.into_iter().collect();
        self
    }

    pub fn with_fs(mut self, fs: &str) -> Self {
        self.fs = Some(Criterion::Exact(fs.to_string()));
        self
    }

    pub fn with_fs_regex(mut self, pattern: &str) -> Result<Self> {
        self.fs = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p FsUse> + '_ {
        info!("Generating fs_use results from {}", self.policy);
        debug!(
            "Ruletypes: {:?}, fs: {:?}, context: {:?}",
            self.ruletypes, self.fs, self.context
        );
        self.policy.fs_uses().filter(move |u| {
            (self.ruletypes.is_empty() || self.ruletypes.contains(&u.ruletype))
                && match_name(&u.fs, &self.fs)
                && self.context.matches(self.policy, &u.context)
        })
    }
}

/// Query genfscon statements by filesystem, path and file type.
#[derive(Debug, Clone)]
pub struct GenfsconQuery<'p> {
    policy: &'p Policy,
    fs: Option<Criterion<String>>,
    path: Option<Criterion<String>>,
    filetype: Option<FileType>,
    context: ContextCriteria,
}

impl<'p> GenfsconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            fs: None,
            path: None,
            filetype: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_fs(mut self, fs: &str) -> Self {
        self.fs = Some(Criterion::Exact(fs.to_string()));
        self
    }

    pub fn with_fs_regex(mut self, pattern: &str) -> Result<Self> {
        self.fs = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(Criterion::Exact(path.to_string()));
        self
    }

    pub fn with_path_regex(mut self, pattern: &str) -> Result<Self> {
        self.path = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    /// Statements without a file type apply to all types and do not match.
    pub fn with_filetype(mut self, filetype: FileType) -> Self {
        self.filetype = Some(filetype);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Genfscon> + '_ {
        info!("Generating genfscon results from {}", self.policy);
        debug!(
            "Fs: {:?}, path: {:?}, filetype: {:?}, context: {:?}",
            self.fs, self.path, self.filetype, self.context
        );
        self.policy.genfscons().filter(move |g| {
            match_name(&g.fs, &self.fs)
                && match_name(&g.path, &self.path)
                && self.filetype.map_or(true, |t| g.filetype == Some(t))
                && self.context.matches(self.policy, &g.context)
        })
    }
}

// =============================================================================
// XEN AND DEVICE CONTEXTS
// =============================================================================

/// Query pcidevicecon statements.
#[derive(Debug, Clone)]
pub struct PcideviceconQuery<'p> {
    policy: &'p Policy,
    device: Option<u32>,
    context: ContextCriteria,
}

impl<'p> PcideviceconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            device: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_device(mut self, device: u32) -> Self {
        self.device = Some(device);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Pcidevicecon> + '_ {
        info!("Generating pcidevicecon results from {}", self.policy);
        debug!("Device: {:?}, context: {:?}", self.device, self.context);
        self.policy.pcidevicecons().filter(move |d| {
            self.device.map_or(true, |dev| d.device == dev)
                && self.context.matches(self.policy, &d.context)
        })
    }
}

/// Query pirqcon statements.
#[derive(Debug, Clone)]
pub struct PirqconQuery<'p> {
    policy: &'p Policy,
    irq: Option<u32>,
    context: ContextCriteria,
}

impl<'p> PirqconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            irq: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_irq(mut self, irq: u32) -> Self {
        self.irq = Some(irq);
        self
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Pirqcon> + '_ {
        info!("Generating pirqcon results from {}", self.policy);
        debug!("IRQ: {:?}, context: {:?}", self.irq, self.context);
        self.policy.pirqcons().filter(move |p| {
            self.irq.map_or(true, |irq| p.irq == irq)
                && self.context.matches(self.policy, &p.context)
        })
    }
}

/// Query ioportcon statements by port range.
#[derive(Debug, Clone)]
pub struct IoportconQuery<'p> {
    policy: &'p Policy,
    ports: Option<(NumRange<u32>, RangeMatch)>,
    context: ContextCriteria,
}

impl<'p> IoportconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            ports: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_ports(mut self, low: u32, high: u32, mode: RangeMatch) -> Result<Self> {
        self.ports = Some(num_range(low, high, mode)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Ioportcon> + '_ {
        info!("Generating ioportcon results from {}", self.policy);
        debug!("Ports: {:?}, context: {:?}", self.ports, self.context);
        self.policy.ioportcons().filter(move |p| {
            match_num_range(&p.ports, &self.ports) && self.context.matches(self.policy, &p.context)
        })
    }
}

/// Query iomemcon statements by address range.
#[derive(Debug, Clone)]
pub struct IomemconQuery<'p> {
    policy: &'p Policy,
    addr: Option<(NumRange<u64>, RangeMatch)>,
    context: ContextCriteria,
}

impl<'p> IomemconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            addr: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_addr(mut self, low: u64, high: u64, mode: RangeMatch) -> Result<Self> {
        self.addr = Some(num_range(low, high, mode)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Iomemcon> + '_ {
        info!("Generating iomemcon results from {}", self.policy);
        debug!("Addr: {:?}, context: {:?}", self.addr, self.context);
        self.policy.iomemcons().filter(move |m| {
            match_num_range(&m.addr, &self.addr) && self.context.matches(self.policy, &m.context)
        })
    }
}

/// Query devicetreecon statements by path.
#[derive(Debug, Clone)]
pub struct DevicetreeconQuery<'p> {
    policy: &'p Policy,
    path: Option<Criterion<String>>,
    context: ContextCriteria,
}

impl<'p> DevicetreeconQuery<'p> {
    pub fn new(policy: &'p Policy) -> Self {
        Self {
            policy,
            path: None,
            context: ContextCriteria::default(),
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(Criterion::Exact(path.to_string()));
        self
    }

    pub fn with_path_regex(mut self, pattern: &str) -> Result<Self> {
        self.path = Some(Criterion::regex(pattern)?);
        Ok(self)
    }

    pub fn results(&self) -> impl Iterator<Item = &'p Devicetreecon> + '_ {
        info!("Generating devicetreecon results from {}", self.policy);
        debug!("Path: {:?}, context: {:?}", self.path, self.context);
        self.policy.devicetreecons().filter(move |d| {
            match_name(&d.path, &self.path)
                && self.context.matches(self.policy, &d.context)
        })
    }
}

impl_context_query!(
    InitialSidQuery,
    PortconQuery,
    NetifconQuery,
    NodeconQuery,
    IbpkeyconQuery,
    IbendportconQuery,
    FsUseQuery,
    GenfsconQuery,
    PcideviceconQuery,
    PirqconQuery,
    IoportconQuery,
    IomemconQuery,
    DevicetreeconQuery,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyBuilder;
    use crate::query::ContextQuery;

    fn policy() -> Policy {
        let mut b = PolicyBuilder::new("labeling");
        b.mls(true);
        b.sensitivity("s0", &[]).unwrap();
        b.sensitivity("s1", &[]).unwrap();
        b.category("c0", &[]).unwrap();
        b.level_decl("s0:c0").unwrap();
        b.level_decl("s1:c0").unwrap();
        b.type_("http_port_t", &[]).unwrap();
        b.type_("ssh_port_t", &[]).unwrap();
        b.type_("netif_t", &[]).unwrap();
        b.type_("node_t", &[]).unwrap();
        b.type_("fs_t", &[]).unwrap();
        b.type_("proc_t", &[]).unwrap();
        b.type_("device_t", &[]).unwrap();
        b.type_("kernel_t", &[]).unwrap();
        b.role("object_r", &[]).unwrap();
        b.role("system_r", &[]).unwrap();
        b.user("system_u", &["object_r", "system_r"], Some("s0"), Some("s0 - s1:c0"))
            .unwrap();

        b.initialsid("kernel", Some("system_u:system_r:kernel_t:s0")).unwrap();
        b.initialsid("unlabeled", None).unwrap();
        b.portcon(PortconProtocol::Tcp, 80, 80, "system_u:object_r:http_port_t:s0")
            .unwrap();
        b.portcon(PortconProtocol::Tcp, 8000, 8100, "system_u:object_r:http_port_t:s0")
            .unwrap();
        b.portcon(PortconProtocol::Udp, 22, 22, "system_u:object_r:ssh_port_t:s1")
            .unwrap();
        b.netifcon(
            "eth0",
            "system_u:object_r:netif_t:s0",
            "system_u:object_r:netif_t:s0",
        )
        .unwrap();
        b.nodecon("10.0.0.0/8", "system_u:object_r:node_t:s0").unwrap();
        b.nodecon("fe80::/10", "system_u:object_r:node_t:s0").unwrap();
        b.fs_use(FsUseRuletype::FsUseXattr, "ext4", "system_u:object_r:fs_t:s0")
            .unwrap();
        b.fs_use(FsUseRuletype::FsUseTask, "pipefs", "system_u:object_r:fs_t:s0")
            .unwrap();
        b.genfscon("proc", "/", None, "system_u:object_r:proc_t:s0").unwrap();
        b.genfscon("proc", "/kmsg", Some(FileType::File), "system_u:object_r:proc_t:s1")
            .unwrap();
        b.ibpkeycon("fe80::", 1, 0x10, "system_u:object_r:device_t:s0").unwrap();
        b.ibendportcon("mlx4_0", 1, "system_u:object_r:device_t:s0").unwrap();
        b.pcidevicecon(0xc800, "system_u:object_r:device_t:s0").unwrap();
        b.pirqcon(33, "system_u:object_r:device_t:s0").unwrap();
        b.ioportcon(0x60, 0x64, "system_u:object_r:device_t:s0").unwrap();
        b.iomemcon(0xfe000, 0xfefff, "system_u:object_r:device_t:s0").unwrap();
        b.devicetreecon("/soc/uart", "system_u:object_r:device_t:s0").unwrap();
        b.build()
    }

    // =========================================================================
    // Network
    // =========================================================================

    #[test]
    fn test_portcon_ranges() {
        let p = policy();
        let q = PortconQuery::new(&p)
            .with_ports(8050, 8060, RangeMatch::Subset { proper: false })
            .unwrap();
        assert_eq!(q.results().count(), 1);

        let q = PortconQuery::new(&p)
            .with_ports(1, 1024, RangeMatch::Superset { proper: false })
            .unwrap();
        assert_eq!(q.results().count(), 2);

        let q = PortconQuery::new(&p)
            .with_ports(1, 1024, RangeMatch::Superset { proper: false })
            .unwrap()
            .with_protocol(PortconProtocol::Tcp);
        assert_eq!(q.results().count(), 1);

        assert!(matches!(
            PortconQuery::new(&p).with_ports(90, 80, RangeMatch::Exact),
            Err(PolicyError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_portcon_context() {
        let p = policy();
        let q = PortconQuery::new(&p).with_type("http_port_t").unwrap();
        assert_eq!(q.results().count(), 2);

        let q = PortconQuery::new(&p)
            .with_range("s1", RangeMatch::Exact)
            .unwrap();
        assert_eq!(q.results().count(), 1);

        let q = PortconQuery::new(&p).with_user_regex("^staff").unwrap();
        assert_eq!(q.results().count(), 0);
    }

    #[test]
    fn test_nodecon_network() {
        let p = policy();
        let q = NodeconQuery::new(&p).with_network("10.1.0.0/16").unwrap();
        assert_eq!(q.results().count(), 0);

        let q = NodeconQuery::new(&p)
            .with_network("10.1.0.0/16")
            .unwrap()
            .with_network_overlap(true);
        assert_eq!(q.results().count(), 1);

        let q = NodeconQuery::new(&p).with_ip_version(IpVersion::V6);
        assert_eq!(q.results().count(), 1);

        assert!(NodeconQuery::new(&p).with_network("10.0.0.0/33").is_err());
    }

    #[test]
    fn test_netif_and_infiniband() {
        let p = policy();
        assert_eq!(NetifconQuery::new(&p).with_name("eth0").results().count(), 1);
        assert_eq!(
            NetifconQuery::new(&p)
                .with_name_regex("^wl")
                .unwrap()
                .results()
                .count(),
            0
        );

        let q = IbpkeyconQuery::new(&p)
            .with_subnet_prefix("fe80::")
            .unwrap()
            .with_pkeys(2, 3, RangeMatch::Overlap)
            .unwrap();
        assert_eq!(q.results().count(), 1);
        assert!(IbpkeyconQuery::new(&p).with_subnet_prefix("bogus").is_err());

        let q = IbendportconQuery::new(&p).with_port(1).unwrap();
        assert_eq!(q.results().count(), 1);
        assert!(IbendportconQuery::new(&p).with_port(0).is_err());
    }

    // =========================================================================
    // Filesystems, devices, SIDs
    // =========================================================================

    #[test]
    fn test_fs_use_and_genfscon() {
        let p = policy();
        let q = FsUseQuery::new(&p).with_ruletypes([FsUseRuletype::FsUseTask]);
        assert_eq!(q.results().count(), 1);
        let q = FsUseQuery::new(&p).with_fs_regex("^ext").unwrap();
        assert_eq!(q.results().count(), 1);

        let q = GenfsconQuery::new(&p).with_fs("proc");
        assert_eq!(q.results().count(), 2);
        let q = GenfsconQuery::new(&p).with_filetype(FileType::File);
        assert_eq!(q.results().count(), 1);
        let q = GenfsconQuery::new(&p).with_path("/");
        assert_eq!(q.results().count(), 1);
    }

    #[test]
    fn test_device_contexts() {
        let p = policy();
        assert_eq!(PcideviceconQuery::new(&p).with_device(0xc800).results().count(), 1);
        assert_eq!(PirqconQuery::new(&p).with_irq(34).results().count(), 0);

        let q = IoportconQuery::new(&p)
            .with_ports(0x64, 0x64, RangeMatch::Subset { proper: false })
            .unwrap();
        assert_eq!(q.results().count(), 1);

        let q = IomemconQuery::new(&p)
            .with_addr(0xfe000, 0xfefff, RangeMatch::Exact)
            .unwrap();
        assert_eq!(q.results().count(), 1);

        let q = DevicetreeconQuery::new(&p).with_path_regex("uart$").unwrap();
        assert_eq!(q.results().count(), 1);
    }

    #[test]
    fn test_initialsid_optional_context() {
        let p = policy();
        assert_eq!(InitialSidQuery::new(&p).results().count(), 2);

        let q = InitialSidQuery::new(&p).with_type("kernel_t").unwrap();
        let found: Vec<_> = q.results().map(|s| s.name.as_str()).collect();
        assert_eq!(found, vec!["kernel"]);

        let q = InitialSidQuery::new(&p).with_name("unlabeled").unwrap();
        assert_eq!(q.results().count(), 1);
        assert!(matches!(
            InitialSidQuery::new(&p).with_name("bogus"),
            Err(PolicyError::InvalidInitialSid(_))
        ));
    }
}
