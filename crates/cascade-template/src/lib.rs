//! cascade-template - Template expansion layer for Cascade
//!
//! Implements the small, fixed template dialect recognised in model SQL:
//! `{{ ref(...) }}`, `{{ source(...) }}`, `{{ this }}`, `{{ is_incremental() }}`,
//! `{% if ... %}` blocks, and the leading `-- config:` / `-- depends_on:`
//! comment headers. The dialect is deliberately not Turing-complete; a
//! hand-written expander covers the whole construct set.

pub mod error;
pub mod expander;
pub mod header;

pub use error::{TemplateError, TemplateResult};
pub use expander::{expand, ExpandContext, Expansion, REF_PREFIX, SRC_PREFIX, THIS_TOKEN};
pub use header::{extract_header, Header};
