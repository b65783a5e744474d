//
// Copyright 2025 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Catalog of RAS event ids the node reports on its own behalf.

use core::fmt;

use strum::{Display, EnumIter, FromRepr, IntoEnumIterator, IntoStaticStr};

#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, FromRepr, IntoStaticStr, PartialEq)]
#[repr(u32)]
pub enum RasId {
    #[strum(serialize = "BGRAS_ID_NONE")]
    None = 0xa0000,
    #[strum(serialize = "BGRAS_ID_PCIE_UNSUPPORTED_ADAPTER")]
    PcieUnsupportedAdapter = 0xa0001,
    #[strum(serialize = "BGRAS_ID_PCIE_MISSING_ADAPTER_VPD")]
    PcieMissingAdapterVpd = 0xa0002,
    #[strum(serialize = "BGRAS_ID_BGSYS_MOUNT_FAILURE")]
    BgsysMountFailure = 0xa0003,
    #[strum(serialize = "BGRAS_ID_GPFS_START_FAILURE")]
    GpfsStartFailure = 0xa0004,
    #[strum(serialize = "BGRAS_ID_NO_NETWORK_INTERFACE_DEFINED")]
    NoNetworkInterfaceDefined = 0xa0005,
    #[strum(serialize = "BGRAS_ID_SCRIPT_FAILURE")]
    ScriptFailure = 0xa0006,
    #[strum(serialize = "BGRAS_ID_BGQ_DISTRO_MISSING")]
    DistroMissing = 0xa0007,
    #[strum(serialize = "BGRAS_ID_GPFS_INIT_FAILURE")]
    GpfsInitFailure = 0xa0008,
    #[strum(serialize = "BGRAS_ID_PCIE_LINK_DEGRADED")]
    PcieLinkDegraded = 0xa0009,
    #[strum(serialize = "BGRAS_ID_NETWORK_CONFIG_FAILURE")]
    NetworkConfigFailure = 0xa000a,
    #[strum(serialize = "BGRAS_ID_INT_VECTOR_FAILURE")]
    InterruptVectorFailure = 0xa000b,
    #[strum(serialize = "BGRAS_ID_GPFS_HOSTNAME_FAILURE")]
    GpfsHostnameFailure = 0xa000c,
    /// Sent by the node when it goes down on a fatal error.
    #[strum(serialize = "BGRAS_ID_KERNEL_PANIC")]
    KernelPanic = 0xa000d,
    #[strum(serialize = "BGRAS_ID_ETHERNET_LINK_TIMEOUT")]
    EthernetLinkTimeout = 0xa000e,
    #[strum(serialize = "BGRAS_ID_IB_LINK_TIMEOUT")]
    InfinibandLinkTimeout = 0xa000f,
    #[strum(serialize = "BGRAS_ID_NODE_HEALTH_MONITOR_WARNING")]
    NodeHealthMonitorWarning = 0xa0010,
    #[strum(serialize = "BGRAS_ID_ETHERNET_LINK_LOST")]
    EthernetLinkLost = 0xa0011,
    #[strum(serialize = "BGRAS_ID_IB_LINK_LOST")]
    InfinibandLinkLost = 0xa0012,
    #[strum(serialize = "BGRAS_ID_ROOT_FS_UNRESPONSIVE")]
    RootFsUnresponsive = 0xa0013,
}

/// Writes the catalog in environment variable format, one `NAME=0xVALUE`
/// line per id.
pub fn write_catalog(out: &mut impl fmt::Write) -> fmt::Result {
    for id in RasId::iter() {
        writeln!(out, "{id}=0x{:04x}", id as u32)?;
    }
    Ok(())
}
