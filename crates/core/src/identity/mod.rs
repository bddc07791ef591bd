mod keypair;

pub use keypair::{KeyPair, KeyPairError, PublicKey};
