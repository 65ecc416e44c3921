pub mod activations;
mod init;
pub mod layers;
pub mod loss;
mod sequential;
mod topology;

pub use init::BoxMuller;
pub use sequential::Sequential;
pub use topology::Topology;
