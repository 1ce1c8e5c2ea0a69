//! Token accounting with the cl100k_base BPE

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

/// Loaded once. `None` if the model failed to initialize; the failure is
/// logged the first time and counting is then unavailable.
static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k_base() -> Option<&'static CoreBPE> {
    CL100K_BASE
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!("Token counting unavailable: {}", e);
                None
            }
        })
        .as_ref()
}

/// Number of cl100k_base tokens in `text`, or `None` if the tokenizer could
/// not be loaded.
pub fn count_tokens(text: &str) -> Option<usize> {
    cl100k_base().map(|bpe| bpe.encode_with_special_tokens(text).len())
}
