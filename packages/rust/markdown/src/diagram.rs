//! Mermaid block detection and render-URL encoding.
//!
//! Diagram sources are zlib-compressed at the best level and encoded with the
//! URL-safe base64 alphabet, which is the path format Kroki-style render
//! services decode.

use std::io::Write;
use std::ops::Range;
use std::sync::LazyLock;

use base64::Engine;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use regex::Regex;

use wikiscribe_shared::{Result, WikiScribeError};

/// Alt text of every embedded diagram image.
pub const DIAGRAM_ALT_TEXT: &str = "Architecture Diagram";

/// Fence tagged `mermaid` (any case), optional whitespace, lazy body, closing fence.
static MERMAID_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*mermaid\s*(.*?)```").expect("valid regex")
});

/// A fenced mermaid block found in a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// Byte range of the whole fenced block, fences included.
    pub range: Range<usize>,
    /// Trimmed diagram source.
    pub source: String,
}

/// Find all mermaid blocks, non-overlapping and in document order.
pub fn find_diagram_blocks(markdown: &str) -> Vec<DiagramBlock> {
    MERMAID_BLOCK_RE
        .captures_iter(markdown)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some(DiagramBlock {
                range: whole.range(),
                source: body.as_str().trim().to_string(),
            })
        })
        .collect()
}

/// Compress and encode a diagram source for use in a render URL path.
pub fn encode_diagram(source: &str) -> Result<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(source.as_bytes())
        .map_err(|e| WikiScribeError::Render(format!("diagram compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| WikiScribeError::Render(format!("diagram compression failed: {e}")))?;

    Ok(base64::engine::general_purpose::URL_SAFE.encode(compressed))
}

/// Build `<render_host>/mermaid/png/<encoded>` for a diagram source.
pub fn diagram_url(render_host: &str, source: &str) -> Result<String> {
    let encoded = encode_diagram(source)?;
    Ok(format!(
        "{}/mermaid/png/{encoded}",
        render_host.trim_end_matches('/')
    ))
}

/// The inline image tag that replaces a diagram block.
pub fn image_tag(url: &str) -> String {
    format!(
        r#"<img src="{}" alt="{DIAGRAM_ALT_TEXT}" />"#,
        escape_attr(url)
    )
}

/// The text spliced in place of a diagram block.
///
/// A bare tag line opens a raw HTML block that only a blank line closes, so
/// the tag is followed by one to keep the next line in Markdown.
pub(crate) fn block_replacement(url: &str) -> String {
    format!("{}\n\n", image_tag(url))
}

/// Replace each block's byte range with the matching replacement text.
///
/// `blocks` must be sorted and non-overlapping, as returned by
/// [`find_diagram_blocks`].
pub(crate) fn splice_blocks(markdown: &str, blocks: &[DiagramBlock], replacements: &[String]) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut cursor = 0;
    for (block, replacement) in blocks.iter().zip(replacements) {
        out.push_str(&markdown[cursor..block.range.start]);
        out.push_str(replacement);
        cursor = block.range.end;
    }
    out.push_str(&markdown[cursor..]);
    out
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn decode(encoded: &str) -> String {
        let compressed = base64::engine::general_purpose::URL_SAFE
            .decode(encoded)
            .expect("valid base64");
        let mut out = String::new();
        flate2::read::ZlibDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .expect("valid zlib");
        out
    }

    #[test]
    fn finds_single_block() {
        let md = "# T\n\n```mermaid\ngraph TD; A-->B;\n```\n\nafter";
        let blocks = find_diagram_blocks(md);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].source, "graph TD; A-->B;");
        assert_eq!(&md[blocks[0].range.clone()], "```mermaid\ngraph TD; A-->B;\n```");
    }

    #[test]
    fn finds_blocks_case_insensitively_in_order() {
        let md = "```Mermaid  \nA-->B\n```\ntext\n```MERMAID\nC-->D\n```";
        let sources: Vec<_> = find_diagram_blocks(md)
            .into_iter()
            .map(|b| b.source)
            .collect();
        assert_eq!(sources, vec!["A-->B", "C-->D"]);
    }

    #[test]
    fn ignores_other_fences() {
        let md = "```rust\nfn main() {}\n```\n\n```\nplain\n```";
        assert!(find_diagram_blocks(md).is_empty());
    }

    #[test]
    fn url_uses_render_host_and_decodes_to_source() {
        let url = diagram_url("https://kroki.io/", "graph TD; A-->B;").unwrap();
        let prefix = "https://kroki.io/mermaid/png/";
        assert!(url.starts_with(prefix), "{url}");
        assert_eq!(decode(&url[prefix.len()..]), "graph TD; A-->B;");
    }

    #[test]
    fn encoding_is_deterministic_and_url_safe() {
        let source = "graph LR\n  client -->|HTTP/JSON??| api[(Store)]\n  api --> db";
        let a = encode_diagram(source).unwrap();
        assert_eq!(a, encode_diagram(source).unwrap());
        assert!(!a.contains('+') && !a.contains('/'));
    }

    #[test]
    fn image_tag_escapes_src() {
        let tag = image_tag("https://x.test/a?b=1&c=\"2\"");
        assert_eq!(
            tag,
            r#"<img src="https://x.test/a?b=1&amp;c=&quot;2&quot;" alt="Architecture Diagram" />"#
        );
    }

    #[test]
    fn replacement_ends_with_blank_line() {
        let replacement = block_replacement("https://x.test/d.png");
        assert!(replacement.starts_with("<img src=\"https://x.test/d.png\""));
        assert!(replacement.ends_with(" />\n\n"));
    }

    #[test]
    fn splice_replaces_ranges() {
        let md = "a ```mermaid\nX\n``` b ```mermaid\nY\n``` c";
        let blocks = find_diagram_blocks(md);
        let out = splice_blocks(md, &blocks, &["[1]".into(), "[2]".into()]);
        assert_eq!(out, "a [1] b [2] c");
    }
}
