pub mod capture;
pub mod codec;
pub mod encoder;
pub mod harness;
pub mod lockfile;
pub mod observability;
pub mod presets;
pub mod recipe;
pub mod runner;
pub mod source;
pub mod validation;
pub mod video;

pub use codec::{CodecEngine, CodecFactory, Decoder, Packet};
pub use encoder::{Encoder, TwoPassStats};
pub use harness::{EncoderHooks, EncoderTest, HarnessError, TestMode};
pub use recipe::Recipe;
