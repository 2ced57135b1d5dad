pub mod byte_buffer;
pub mod message_buffer;

pub use byte_buffer::ByteBuffer;
pub use message_buffer::MessageBuffer;
