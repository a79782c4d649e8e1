//! Message buffers: a cursor-based byte container with typed read/write and
//! a fixed-capacity pool that recycles them between messages.

pub mod codec;
pub mod message_buffer;
pub mod pool;

pub use codec::{Decode, Encode};
pub use message_buffer::MessageBuffer;
pub use pool::{BufferPool, PooledBuffer};
