mod key;

pub use key::InstrumentKey;
