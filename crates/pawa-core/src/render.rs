//! Streaming Markdown to HTML rendering for assistant replies.
//!
//! The renderer always works on the whole raw reply text. During streaming the
//! caller keeps the raw text in a [`StreamAccumulator`] and re-renders it after
//! every chunk; rendered HTML is never fed back in.
//!
//! Supported subset: fenced code blocks, inline code, `**bold**`, `*italic*`
//! and line breaks. Everything else is shown as escaped text.

use regex::Regex;
use std::sync::LazyLock;

/// Language shown on a fenced block that has no tag.
pub const DEFAULT_LANGUAGE: &str = "text";

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```([A-Za-z0-9_]+)?\n(?s:(.*?))```").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*]+)\*").unwrap());

/// A piece of raw reply text, either prose or a closed fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// `body` is already trimmed of surrounding whitespace.
    Code { language: &'a str, body: &'a str },
}

/// A fenced code block found while rendering, addressable by `index` from
/// the `data-block` attribute of its action buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub index: usize,
    pub language: String,
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMarkdown {
    pub html: String,
    pub code_blocks: Vec<CodeBlock>,
}

/// Split raw text into prose and closed code fences.
///
/// A fence without a closing marker is not a code block; it stays in the
/// surrounding text and renders as literal backticks.
pub fn segments(raw: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;

    for caps in FENCE.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            out.push(Segment::Text(&raw[last..whole.start()]));
        }
        let language = caps.get(1).map(|m| m.as_str()).unwrap_or(DEFAULT_LANGUAGE);
        let body = caps.get(2).map(|m| m.as_str()).unwrap_or_default().trim();
        out.push(Segment::Code { language, body });
        last = whole.end();
    }

    if last < raw.len() {
        out.push(Segment::Text(&raw[last..]));
    }
    out
}

pub fn render_markdown(raw: &str) -> RenderedMarkdown {
    let mut rendered = RenderedMarkdown::default();

    for segment in segments(raw) {
        match segment {
            Segment::Text(text) => rendered.html.push_str(&render_inline(text)),
            Segment::Code { language, body } => {
                let index = rendered.code_blocks.len();
                rendered
                    .html
                    .push_str(&code_block_html(index, language, &escape_html(body)));
                rendered.code_blocks.push(CodeBlock {
                    index,
                    language: language.to_string(),
                    code: body.to_string(),
                });
            }
        }
    }

    rendered
}

/// Convenience wrapper when the code block list is not needed.
pub fn render_html(raw: &str) -> String {
    render_markdown(raw).html
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            // Reserved so rendered output never carries raw NULs
            '\0' => out.push('\u{FFFD}'),
            _ => out.push(c),
        }
    }
    out
}

/// Styles picked up by the inline passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub code: bool,
    pub bold: bool,
    pub italic: bool,
}

/// A run of prose sharing one [`InlineStyle`]. `text` is raw, unescaped, and
/// may contain newlines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSpan {
    pub text: String,
    pub style: InlineStyle,
}

/// Run the inline passes over prose: code spans, then bold, then italic.
///
/// Each pass sees the text left by the one before with its markers removed,
/// so a marker consumed by an earlier pass never opens a later one. Both the
/// HTML output and the terminal shell draw from these spans.
pub fn inline_spans(text: &str) -> Vec<InlineSpan> {
    let mut chars: Vec<(char, InlineStyle)> =
        text.chars().map(|c| (c, InlineStyle::default())).collect();
    apply_pass(&mut chars, &INLINE_CODE, |s| s.code = true);
    apply_pass(&mut chars, &BOLD, |s| s.bold = true);
    apply_pass(&mut chars, &ITALIC, |s| s.italic = true);

    let mut spans: Vec<InlineSpan> = Vec::new();
    for (c, style) in chars {
        match spans.last_mut() {
            Some(span) if span.style == style => span.text.push(c),
            _ => spans.push(InlineSpan {
                text: c.to_string(),
                style,
            }),
        }
    }
    spans
}

/// Mark the captured text of every match and drop the surrounding markers.
fn apply_pass(chars: &mut Vec<(char, InlineStyle)>, pattern: &Regex, mark: impl Fn(&mut InlineStyle)) {
    let flat: String = chars.iter().map(|(c, _)| *c).collect();
    let starts: Vec<usize> = flat.char_indices().map(|(i, _)| i).collect();
    let char_at = |byte: usize| starts.partition_point(|&b| b < byte);

    let mut keep = vec![true; chars.len()];
    for caps in pattern.captures_iter(&flat) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let (inner_start, inner_end) = (char_at(inner.start()), char_at(inner.end()));
        for i in char_at(whole.start())..char_at(whole.end()) {
            if (inner_start..inner_end).contains(&i) {
                mark(&mut chars[i].1);
            } else {
                keep[i] = false;
            }
        }
    }

    let mut flags = keep.into_iter();
    chars.retain(|_| flags.next().unwrap_or(true));
}

/// HTML for prose. Newlines become `<br>`.
fn render_inline(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    for span in inline_spans(text) {
        let body = escape_html(&span.text).replace('\n', "<br>");
        let InlineStyle { code, bold, italic } = span.style;
        if bold {
            html.push_str("<strong>");
        }
        if italic {
            html.push_str("<em>");
        }
        if code {
            html.push_str("<code>");
        }
        html.push_str(&body);
        if code {
            html.push_str("</code>");
        }
        if italic {
            html.push_str("</em>");
        }
        if bold {
            html.push_str("</strong>");
        }
    }
    html
}

fn code_block_html(index: usize, language: &str, escaped_body: &str) -> String {
    format!(
        concat!(
            r#"<div class="code-block" data-block="{index}">"#,
            r#"<div class="code-block-header"><span>{lang}</span>"#,
            r#"<div class="code-block-actions">"#,
            r#"<button data-action="copy" data-block="{index}" title="Copy code">Copy</button>"#,
            r#"<button data-action="apply" data-block="{index}" data-language="{lang}" title="Apply to editor">Apply</button>"#,
            r#"</div></div>"#,
            r#"<pre><code class="language-{lang}">{body}</code></pre></div>"#,
        ),
        index = index,
        lang = language,
        body = escaped_body,
    )
}

/// Raw text of the assistant turn currently being streamed.
///
/// `None` between turns. At most one turn is accumulated at a time.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh turn, discarding anything left from the previous one.
    pub fn begin(&mut self) {
        self.buffer = Some(String::new());
    }

    /// Append a chunk and re-render the whole reply so far.
    ///
    /// Starts a turn implicitly if none is active.
    pub fn push(&mut self, chunk: &str) -> RenderedMarkdown {
        let buffer = self.buffer.get_or_insert_with(String::new);
        buffer.push_str(chunk);
        render_markdown(buffer)
    }

    pub fn render(&self) -> RenderedMarkdown {
        self.buffer
            .as_deref()
            .map(render_markdown)
            .unwrap_or_default()
    }

    pub fn text(&self) -> Option<&str> {
        self.buffer.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.buffer.is_some()
    }

    /// End the turn and hand back its raw text.
    pub fn finish(&mut self) -> Option<String> {
        self.buffer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_text_is_escaped_with_line_breaks() {
        for input in ["hello", "a < b && c > d", "line one\nline two\n", "it's \"quoted\"", ""] {
            let expected = escape_html(input).replace('\n', "<br>");
            assert_eq!(render_html(input), expected, "input: {input:?}");
        }
    }

    #[test]
    fn test_fenced_block_with_language() {
        let rendered = render_markdown("```js\nconst x=1;\n```");

        assert_eq!(rendered.code_blocks.len(), 1);
        assert_eq!(rendered.code_blocks[0].language, "js");
        assert_eq!(rendered.code_blocks[0].code, "const x=1;");
        assert!(rendered.html.contains("<span>js</span>"));
        assert!(rendered
            .html
            .contains(r#"<code class="language-js">const x=1;</code>"#));
        assert_eq!(rendered.html.matches("class=\"code-block\"").count(), 1);
    }

    #[test]
    fn test_fence_without_language_defaults_to_text() {
        let rendered = render_markdown("```\n  ls -la  \n```");
        assert_eq!(rendered.code_blocks[0].language, "text");
        assert_eq!(rendered.code_blocks[0].code, "ls -la");
    }

    #[test]
    fn test_unterminated_fence_stays_literal() {
        let html = render_html("```py\ncode");
        assert!(!html.contains("code-block"));
        assert_eq!(html, "```py<br>code");
    }

    #[test]
    fn test_streamed_chunks_match_one_shot_render() {
        let mut acc = StreamAccumulator::new();
        acc.begin();
        acc.push("Hel");
        acc.push("lo ");
        let last = acc.push("world");

        assert_eq!(last, render_markdown("Hello world"));
        assert_eq!(acc.finish().as_deref(), Some("Hello world"));
        assert!(!acc.is_active());
    }

    #[test]
    fn test_fence_split_across_chunks_becomes_block_once_closed() {
        let mut acc = StreamAccumulator::new();
        let partial = acc.push("```rust\nfn main() {}\n");
        assert!(partial.code_blocks.is_empty());

        let closed = acc.push("```\n");
        assert_eq!(closed.code_blocks.len(), 1);
        assert_eq!(closed.code_blocks[0].code, "fn main() {}");
    }

    #[test]
    fn test_code_block_content_is_not_reinterpreted() {
        let rendered = render_markdown("```\nlet p = *a * *b;\n**x**\n```");
        assert!(!rendered.html.contains("<em>"));
        assert!(!rendered.html.contains("<strong>"));
        assert!(rendered.html.contains("let p = *a * *b;\n**x**"));
    }

    #[test]
    fn test_bold_runs_before_italic() {
        assert_eq!(
            render_html("**b** and *i*"),
            "<strong>b</strong> and <em>i</em>"
        );
    }

    #[test]
    fn test_inline_code() {
        assert_eq!(render_html("use `Vec<u8>` here"), "use <code>Vec&lt;u8&gt;</code> here");
    }

    #[test]
    fn test_code_body_is_escaped_but_copy_text_is_raw() {
        let rendered = render_markdown("```html\n<b>hi</b>\n```");
        assert!(rendered.html.contains("&lt;b&gt;hi&lt;/b&gt;"));
        assert_eq!(rendered.code_blocks[0].code, "<b>hi</b>");
    }

    #[test]
    fn test_buttons_use_data_attributes() {
        let rendered = render_markdown("a\n```py\nx\n```\nb\n```sh\ny\n```");
        assert_eq!(rendered.code_blocks.len(), 2);
        assert_eq!(rendered.code_blocks[1].index, 1);
        assert!(rendered.html.contains(r#"data-action="apply" data-block="1" data-language="sh""#));
        assert!(!rendered.html.contains("onclick"));
    }

    #[test]
    fn test_script_is_neutralised() {
        let html = render_html("<script>alert('x')</script>");
        assert!(!html.contains("<script>"));
        assert!(html.starts_with("&lt;script&gt;"));
    }

    #[test]
    fn test_segments_keep_surrounding_text() {
        let segs = segments("before\n```c\nint x;\n```after");
        assert_eq!(
            segs,
            vec![
                Segment::Text("before\n"),
                Segment::Code { language: "c", body: "int x;" },
                Segment::Text("after"),
            ]
        );
    }

    #[test]
    fn test_inline_spans_follow_pass_order() {
        let spans = inline_spans("an *italic* and **bold** `x*y*`");
        let styled: Vec<(&str, InlineStyle)> =
            spans.iter().map(|s| (s.text.as_str(), s.style)).collect();
        let plain = InlineStyle::default();
        assert_eq!(
            styled,
            vec![
                ("an ", plain),
                ("italic", InlineStyle { italic: true, ..plain }),
                (" and ", plain),
                ("bold", InlineStyle { bold: true, ..plain }),
                (" ", plain),
                ("x", InlineStyle { code: true, ..plain }),
                ("y", InlineStyle { code: true, italic: true, ..plain }),
            ]
        );
    }

    #[test]
    fn test_markers_inside_code_span_still_style() {
        assert_eq!(
            render_html("**a `b` c**"),
            "<strong>a </strong><strong><code>b</code></strong><strong> c</strong>"
        );
    }
}
