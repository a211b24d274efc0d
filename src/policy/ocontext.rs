//! Labeling statements: network, filesystem, device and initial SID contexts.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use super::context::Context;
use super::{Policy, PolicyDisplay};
use crate::error::{PolicyError, Result};

// =============================================================================
// NUMERIC RANGES AND NETWORKS
// =============================================================================

/// Inclusive numeric range (ports, pkeys, I/O addresses).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NumRange<T> {
    pub low: T,
    pub high: T,
}

impl<T: PartialOrd + Copy + fmt::Display> NumRange<T> {
    /// Fails with `InvalidValue` when `low > high`.
    pub fn new(low: T, high: T) -> Result<Self> {
        if low > high {
            return Err(PolicyError::InvalidValue(format!(
                "range low ({}) must be less than or equal to high ({})",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn single(value: T) -> Self {
        Self {
            low: value,
            high: value,
        }
    }
}

impl<T: PartialEq + fmt::Display> fmt::Display for NumRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

/// An IP network in CIDR form, host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix_len: u8,
}

impl IpNetwork {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > max {
            return Err(PolicyError::InvalidValue(format!(
                "{}/{} has an invalid prefix length",
                addr, prefix_len
            )));
        }
        let network = Self { addr, prefix_len };
        Ok(Self {
            addr: network.masked(addr),
            prefix_len,
        })
    }

    /// Build from an address and a dotted/colon netmask, as nodecon statements use.
    pub fn from_netmask(addr: IpAddr, mask: IpAddr) -> Result<Self> {
        let bits = match (addr, mask) {
            (IpAddr::V4(_), IpAddr::V4(m)) => u32::from(m).leading_ones(),
            (IpAddr::V6(_), IpAddr::V6(m)) => u128::from(m).leading_ones(),
            _ => {
                return Err(PolicyError::InvalidValue(format!(
                    "address {} and netmask {} are different IP versions",
                    addr, mask
                )))
            }
        };
        Self::new(addr, bits as u8)
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn version(&self) -> IpVersion {
        match self.addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }

    fn masked(&self, addr: IpAddr) -> IpAddr {
        match addr {
            IpAddr::V4(a) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix_len as u32).unwrap_or(0);
                IpAddr::V4((u32::from(a) & mask).into())
            }
            IpAddr::V6(a) => {
                let mask = u128::MAX
                    .checked_shl(128 - self.prefix_len as u32)
                    .unwrap_or(0);
                IpAddr::V6((u128::from(a) & mask).into())
            }
        }
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        self.version() == IpNetwork::version_of(addr) && self.masked(addr) == self.addr
    }

    /// One network contains the other.
    pub fn overlaps(&self, other: &IpNetwork) -> bool {
        self.contains(other.addr) || other.contains(self.addr)
    }

    fn version_of(addr: IpAddr) -> IpVersion {
        match addr {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl std::str::FromStr for IpNetwork {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PolicyError::InvalidValue(format!("{} is not a valid network", s));
        let (addr, prefix) = match s.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (s, None),
        };
        let addr: IpAddr = addr.trim().parse().map_err(|_| invalid())?;
        let prefix = match prefix {
            Some(p) => p.trim().parse::<u8>().map_err(|_| invalid())?,
            None => match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            },
        };
        IpNetwork::new(addr, prefix)
    }
}

// =============================================================================
// NETWORK CONTEXTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortconProtocol {
    Tcp,
    Udp,
    Dccp,
    Sctp,
}

impl fmt::Display for PortconProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Dccp => "dccp",
            Self::Sctp => "sctp",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portcon {
    pub protocol: PortconProtocol,
    pub ports: NumRange<u16>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Netifcon {
    pub netif: String,
    pub context: Context,
    pub packet: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nodecon {
    pub network: IpNetwork,
    pub context: Context,
}

impl Nodecon {
    pub fn ip_version(&self) -> IpVersion {
        self.network.version()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ibpkeycon {
    pub subnet_prefix: Ipv6Addr,
    pub pkeys: NumRange<u16>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ibendportcon {
    pub name: String,
    pub port: u8,
    pub context: Context,
}

// =============================================================================
// FILESYSTEM CONTEXTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsUseRuletype {
    FsUseXattr,
    FsUseTrans,
    FsUseTask,
}

impl fmt::Display for FsUseRuletype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FsUseXattr => "fs_use_xattr",
            Self::FsUseTrans => "fs_use_trans",
            Self::FsUseTask => "fs_use_task",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsUse {
    pub ruletype: FsUseRuletype,
    pub fs: String,
    pub context: Context,
}

/// File type restriction on a genfscon statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileType {
    Block,
    Char,
    Dir,
    Fifo,
    File,
    Link,
    Socket,
}

impl FileType {
    /// Parse the `-b`/`-c`/`-d`/`-p`/`--`/`-l`/`-s` spelling.
    pub fn from_flag(flag: &str) -> Result<Self> {
        Ok(match flag {
            "-b" => Self::Block,
            "-c" => Self::Char,
            "-d" => Self::Dir,
            "-p" => Self::Fifo,
            "--" => Self::File,
            "-l" => Self::Link,
            "-s" => Self::Socket,
            _ => {
                return Err(PolicyError::InvalidValue(format!(
                    "{} is not a valid file type",
                    flag
                )))
            }
        })
    }

    pub fn flag(self) -> &'static str {
        match self {
            Self::Block => "-b",
            Self::Char => "-c",
            Self::Dir => "-d",
            Self::Fifo => "-p",
            Self::File => "--",
            Self::Link => "-l",
            Self::Socket => "-s",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genfscon {
    pub fs: String,
    pub path: String,
    /// `None` applies to every file type.
    pub filetype: Option<FileType>,
    pub context: Context,
}

// =============================================================================
// XEN AND DEVICE CONTEXTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcidevicecon {
    pub device: u32,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pirqcon {
    pub irq: u32,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ioportcon {
    pub ports: NumRange<u32>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iomemcon {
    pub addr: NumRange<u64>,
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Devicetreecon {
    pub path: String,
    pub context: Context,
}

// =============================================================================
// INITIAL SIDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialSid {
    pub name: String,
    /// Unlabeled SIDs have no context.
    pub context: Option<Context>,
}

// =============================================================================
// RENDERING
// =============================================================================

impl PolicyDisplay for Portcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portcon {} {} {}", self.protocol, self.ports, self.context.display(policy))
    }
}

impl PolicyDisplay for Netifcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "netifcon {} {} {}",
            self.netif,
            self.context.display(policy),
            self.packet.display(policy)
        )
    }
}

impl PolicyDisplay for Nodecon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nodecon {} {}", self.network, self.context.display(policy))
    }
}

impl PolicyDisplay for Ibpkeycon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ibpkeycon {} {:#x}",
            self.subnet_prefix, self.pkeys.low
        )?;
        if self.pkeys.low != self.pkeys.high {
            write!(f, "-{:#x}", self.pkeys.high)?;
        }
        write!(f, " {}", self.context.display(policy))
    }
}

impl PolicyDisplay for Ibendportcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ibendportcon {} {} {}", self.name, self.port, self.context.display(policy))
    }
}

impl PolicyDisplay for FsUse {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {};", self.ruletype, self.fs, self.context.display(policy))
    }
}

impl PolicyDisplay for Genfscon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "genfscon {} {} ", self.fs, self.path)?;
        if let Some(ft) = self.filetype {
            write!(f, "{} ", ft.flag())?;
        }
        write!(f, "{}", self.context.display(policy))
    }
}

impl PolicyDisplay for Pcidevicecon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pcidevicecon {:#x} {}", self.device, self.context.display(policy))
    }
}

impl PolicyDisplay for Pirqcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pirqcon {} {}", self.irq, self.context.display(policy))
    }
}

impl PolicyDisplay for Ioportcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ioportcon {:#x}", self.ports.low)?;
        if self.ports.low != self.ports.high {
            write!(f, "-{:#x}", self.ports.high)?;
        }
        write!(f, " {}", self.context.display(policy))
    }
}

impl PolicyDisplay for Iomemcon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iomemcon {:#x}", self.addr.low)?;
        if self.addr.low != self.addr.high {
            write!(f, "-{:#x}", self.addr.high)?;
        }
        write!(f, " {}", self.context.display(policy))
    }
}

impl PolicyDisplay for Devicetreecon {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "devicetreecon {} {}", self.path, self.context.display(policy))
    }
}

impl PolicyDisplay for InitialSid {
    fn fmt_with(&self, policy: &Policy, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid {}", self.name)?;
        if let Some(ctx) = &self.context {
            write!(f, " {}", ctx.display(policy))?;
        }
        Ok(())
    }
}
