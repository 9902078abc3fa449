//! Intelligence sources

pub mod attack;
pub mod otx;
pub mod pulsedive;

pub use attack::{load_intrusion_sets, parse_intrusion_sets, AttackDataset};
pub use otx::{OtxClient, OtxConfig, PulseFeed};
pub use pulsedive::PulsediveIndex;
