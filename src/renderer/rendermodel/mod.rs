//! Batched storage and drawing of object geometry.
//!
//! The model is a four level tree: passes hold batch groups (one per
//! shader, material, draw mode and line width), batch groups hold matrix
//! batches (one per model-to-world matrix), matrix batches hold items (one
//! per object section). Batch groups pack their matrix batches into GPU
//! batches of up to the shader's item capacity and draw each with as few
//! indexed draws as visibility allows.

pub mod batch_group;
pub mod flags;
pub mod gpu_batch;
pub mod keys;
pub mod matrix_batch;
pub mod model;
pub mod object_id;
pub mod pass;

pub use batch_group::BatchGroup;
pub use flags::ObjectFlags;
pub use gpu_batch::{GpuBatch, GpuBatchId};
pub use keys::{BatchGroupKey, MatrixBatchItemKey, MatrixBatchKey, PassKey, RenderModelKey};
pub use matrix_batch::{MatrixBatch, MatrixBatchItem};
pub use model::{RenderModel, RenderModelStats};
pub use object_id::{bits_required, mask_from_bits, ObjectIdEncoding};
pub use pass::RenderModelPass;
