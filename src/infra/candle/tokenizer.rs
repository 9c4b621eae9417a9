use crate::core::error::LoadError;
use crate::core::model::{TextTokenizer, TokenId};
use std::path::Path;

pub const TOKENIZER_FILE: &str = "tokenizer.json";

// Common end-of-sequence spellings across llama, deepseek and qwen vocabularies.
const EOS_CANDIDATES: &[&str] = &[
    "</s>",
    "<|endoftext|>",
    "<|im_end|>",
    "<|eot_id|>",
    "<｜end▁of▁sentence｜>",
];

pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_dir(name: &str, dir: &Path) -> Result<Self, LoadError> {
        let path = dir.join(TOKENIZER_FILE);
        if !path.is_file() {
            return Err(LoadError::Tokenizer {
                name: name.to_string(),
                reason: format!("{} is missing", path.display()),
            });
        }

        let inner = tokenizers::Tokenizer::from_file(&path).map_err(|e| LoadError::Tokenizer {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { inner })
    }

    pub fn eos_token(&self) -> Option<TokenId> {
        EOS_CANDIDATES
            .iter()
            .find_map(|token| self.inner.token_to_id(token))
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> anyhow::Result<Vec<TokenId>> {
        let encoding = self.inner.encode(text, true).map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[TokenId], skip_special_tokens: bool) -> anyhow::Result<String> {
        self.inner
            .decode(tokens, skip_special_tokens)
            .map_err(anyhow::Error::msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_LEVEL: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "</s>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"</s>": 0, "hello": 1, "world": 2, "[UNK]": 3},
            "unk_token": "[UNK]"
        }
    }"#;

    #[test]
    fn test_encode_decode_skips_special() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), WORD_LEVEL).unwrap();

        let tokenizer = HfTokenizer::from_dir("tiny", dir.path()).unwrap();
        assert_eq!(tokenizer.encode("hello world").unwrap(), vec![1, 2]);
        assert_eq!(tokenizer.encode("hello there").unwrap(), vec![1, 3]);
        assert_eq!(tokenizer.decode(&[1, 2, 0], true).unwrap(), "hello world");
        assert_eq!(tokenizer.eos_token(), Some(0));
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        match HfTokenizer::from_dir("tiny", dir.path()) {
            Err(LoadError::Tokenizer { name, reason }) => {
                assert_eq!(name, "tiny");
                assert!(reason.contains(TOKENIZER_FILE));
            }
            other => panic!("expected tokenizer error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_corrupt_tokenizer_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), "not json").unwrap();
        assert!(matches!(
            HfTokenizer::from_dir("tiny", dir.path()),
            Err(LoadError::Tokenizer { .. })
        ));
    }
}
