mod error;
mod fabric;
pub mod key;
mod packet;
pub mod report;
mod router;

pub use error::{KeyErr, Result};
pub use fabric::{Fabric, RecordingFabric};
pub use key::{Key, KeyBase, MsgClass, Phase};
pub use packet::Packet;
pub use report::{HostCommand, HostReport, InfoReport, OutputReport};
pub use router::{Router, RouterPort};
