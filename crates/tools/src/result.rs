//! Result discipline: every raw tool output is reduced to the two capped
//! views before it touches the conversation or the operator.

use tl_domain::tool::{ToolResult, DISPLAY_RESULT_MAX, LLM_RESULT_MAX};

use crate::store::ResultStore;
use crate::tool::truncate_to;

/// Bytes of the original output quoted inline when a result is offloaded.
const OFFLOAD_EXCERPT: usize = 2048;

/// Reduce a raw result into its bounded views.
///
/// An `llm` payload over [`LLM_RESULT_MAX`] is offloaded: the full body goes
/// into the store and the conversation gets an excerpt plus the reference
/// id. A payload of exactly the cap stays inline. The display view is
/// independently capped at [`DISPLAY_RESULT_MAX`].
pub fn reduce(store: &ResultStore, raw: ToolResult) -> ToolResult {
    let llm = if raw.llm.len() > LLM_RESULT_MAX {
        let ref_id = store.insert(raw.llm.clone());
        let (excerpt, _) = truncate_to(&raw.llm, OFFLOAD_EXCERPT);
        tracing::debug!(ref_id = %ref_id, total = raw.llm.len(), "offloaded oversize tool result");
        format!(
            "{excerpt}\n\n[output truncated: {total} bytes total; \
             call read_result with ref_id \"{ref_id}\" to page through the rest]",
            total = raw.llm.len(),
        )
    } else {
        raw.llm
    };

    let (display, _) = truncate_to(&raw.display, DISPLAY_RESULT_MAX);

    ToolResult {
        llm,
        display,
        is_error: raw.is_error,
    }
}
