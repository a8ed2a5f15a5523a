//! Container map model: typed configurations, loose-input cleaning,
//! inheritance merging, and integrity checks.
//!
//! A [`ContainerMap`] bundles container configurations together with the
//! volumes, host shares, and networks they refer to. Maps are loaded from
//! structured documents, expanded through `extends` inheritance, verified
//! with [`ContainerMap::check_integrity`], and then handed to the planning
//! engine, which treats them as immutable for the rest of the cycle.

pub mod container;
pub mod error;
pub mod host;
pub mod input;
pub mod map;
pub mod network;
pub mod volume;

pub use container::{ContainerConfiguration, OptionsMap};
pub use error::{MapError, MapResult};
pub use host::{HostEntry, HostVolumes};
pub use input::{
    AttachedVolume, CmdCheck, Command, ContainerLink, ExecCommand, ExecPolicy, HostBind,
    NetworkEndpoint, NetworkMode, PortBinding, UsedVolume, PRESET_NETWORKS,
};
pub use map::{ContainerMap, ALL_GROUP};
pub use network::NetworkConfiguration;
pub use volume::VolumeConfiguration;
