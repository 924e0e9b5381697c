//! Utility helpers shared across client modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Utility modules isolate persistence and page-document concerns from the
//! request pipeline and session logic.

pub mod csrf;
pub mod storage;
