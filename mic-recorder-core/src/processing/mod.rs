pub mod convert;
pub mod normalize;
pub mod ring_buffer;
pub mod wav_format;
