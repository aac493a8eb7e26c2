//! 分词：政策检索的词法打分与特征哈希嵌入共用
//!
//! 英文按空白切分、去掉首尾标点并转小写；含 CJK 字符的片段交给 jieba（搜索引擎模式）。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

static JIEBA: OnceLock<Jieba> = OnceLock::new();

fn jieba() -> &'static Jieba {
    JIEBA.get_or_init(Jieba::new)
}

/// 词首尾需要剥掉的标点
const STRIP_CHARS: &[char] = &['.', ',', ';', ':', '!', '?', '"', '\'', '(', ')', '[', ']', '_'];

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' |
        '\u{3400}'..='\u{4DBF}' |
        '\u{F900}'..='\u{FAFF}' |
        '\u{3040}'..='\u{309F}' |
        '\u{30A0}'..='\u{30FF}'
    )
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 分词：小写、去标点、丢弃空词；CJK 片段用 jieba 细分
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text.split_whitespace() {
        let word = word.trim_matches(STRIP_CHARS);
        if word.is_empty() {
            continue;
        }
        if contains_cjk(word) {
            tokens.extend(
                jieba()
                    .cut_for_search(word, true)
                    .into_iter()
                    .map(|s| s.trim_matches(STRIP_CHARS).to_lowercase())
                    .filter(|s| !s.is_empty() && !s.chars().all(|c| c.is_ascii_punctuation())),
            );
        } else {
            tokens.push(word.to_lowercase());
        }
    }
    tokens
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 词法重叠率：查询词中出现在文档里的比例（0..=1）；查询为空时为 0
pub fn overlap_ratio(query: &HashSet<String>, doc: &HashSet<String>) -> f32 {
    if query.is_empty() {
        return 0.0;
    }
    query.intersection(doc).count() as f32 / query.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("How long do refunds take?");
        assert_eq!(tokens, vec!["how", "long", "do", "refunds", "take"]);
    }

    #[test]
    fn test_tokenize_cjk() {
        let tokens = tokenize("退款需要多久");
        assert!(tokens.iter().any(|t| t.contains("退款")));
    }

    #[test]
    fn test_overlap_ratio() {
        let q = token_set("refund window days");
        let d = token_set("The refund window is 30 days.");
        assert!((overlap_ratio(&q, &d) - 1.0).abs() < 1e-6);

        let q = token_set("refund shipping");
        assert!((overlap_ratio(&q, &d) - 0.5).abs() < 1e-6);
        assert_eq!(overlap_ratio(&HashSet::new(), &d), 0.0);
    }
}
