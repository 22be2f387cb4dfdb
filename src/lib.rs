pub mod checksum;
pub mod error;
pub mod header;
pub mod crypto;
pub mod envelope;
pub mod inner;
pub mod codec;
pub mod block;
pub mod stream;
pub mod perf;
pub mod container;
pub mod explain;

pub use checksum::{checksum8, checksum16};
pub use error::{Result, SsbfError, Structure};
pub use header::{MainHeader, MainFlags, MAGIC};
pub use crypto::SecretKey;
pub use envelope::{EncryptionHeader, Envelope, EnvelopeFlags};
pub use inner::{DataHeader, InnerHeaders, MetaHeader};
pub use block::{BlockFlags, BlockHeader, DataBlock, decode_block};
pub use stream::BlockStream;
pub use container::{Container, DecodeOptions, LayoutReport, decode_file};
pub use explain::{explain, ContainerReport};
