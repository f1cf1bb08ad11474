pub mod filter;
pub mod policy;
pub mod read_pair;

pub use filter::PairFilter;
pub use policy::{PairPolicy, PermissivePolicy, ProperPairPolicy};
pub use read_pair::ReadPair;
