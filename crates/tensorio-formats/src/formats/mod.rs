//! Single-array and flat-map codecs. GGUF lives in `tensorio-gguf`.

pub mod npy;
pub mod safetensors;
