use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// A block-level piece of a bot answer, ready to be laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Paragraph(String),
    ListItem { depth: usize, marker: String, text: String },
    Quote(String),
    Code { language: Option<String>, code: String },
    Rule,
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

struct ListState {
    next_number: Option<u64>,
}

/// Flattens markdown into blocks. Inline formatting is reduced to plain
/// text; links keep their target in parentheses.
pub fn parse(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    let parser = Parser::new_ext(markdown, options);

    let mut blocks = Vec::new();
    let mut buffer = String::new();
    let mut lists: Vec<ListState> = Vec::new();
    let mut item_marker: Option<String> = None;
    let mut quote_depth = 0usize;
    let mut code: Option<(Option<String>, String)> = None;
    let mut link_target: Option<String> = None;

    let flush = |buffer: &mut String,
                 blocks: &mut Vec<Block>,
                 lists: &[ListState],
                 item_marker: &mut Option<String>,
                 quote_depth: usize| {
        let text = buffer.trim().to_string();
        buffer.clear();
        if text.is_empty() {
            return;
        }
        if let Some(marker) = item_marker.take() {
            blocks.push(Block::ListItem {
                depth: lists.len().saturating_sub(1),
                marker,
                text,
            });
        } else if !lists.is_empty() {
            // Continuation paragraph of a list item.
            blocks.push(Block::ListItem {
                depth: lists.len() - 1,
                marker: String::new(),
                text,
            });
        } else if quote_depth > 0 {
            blocks.push(Block::Quote(text));
        } else {
            blocks.push(Block::Paragraph(text));
        }
    };

    for event in parser {
        if code.is_some() {
            match event {
                Event::Text(t) => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&t);
                    }
                }
                Event::End(Tag::CodeBlock(_)) => {
                    if let Some((language, body)) = code.take() {
                        blocks.push(Block::Code {
                            language,
                            code: body.trim_end_matches('\n').to_string(),
                        });
                    }
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::Heading(..)) | Event::Start(Tag::Paragraph) => {}
            Event::End(Tag::Heading(level, ..)) => {
                let text = buffer.trim().to_string();
                buffer.clear();
                blocks.push(Block::Heading {
                    level: heading_level(level),
                    text,
                });
            }
            Event::End(Tag::Paragraph) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
            }
            Event::Start(Tag::BlockQuote) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                quote_depth += 1;
            }
            Event::End(Tag::BlockQuote) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                quote_depth = quote_depth.saturating_sub(1);
            }
            Event::Start(Tag::List(start)) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                lists.push(ListState { next_number: start });
            }
            Event::End(Tag::List(_)) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                lists.pop();
            }
            Event::Start(Tag::Item) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                let marker = match lists.last_mut() {
                    Some(ListState {
                        next_number: Some(n),
                    }) => {
                        let marker = format!("{}.", n);
                        *n += 1;
                        marker
                    }
                    _ => "•".to_string(),
                };
                item_marker = Some(marker);
            }
            Event::End(Tag::Item) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                let language = match kind {
                    CodeBlockKind::Fenced(lang) if !lang.trim().is_empty() => {
                        Some(lang.trim().to_string())
                    }
                    _ => None,
                };
                code = Some((language, String::new()));
            }
            Event::Start(Tag::Link(_, url, _)) => {
                link_target = Some(url.to_string());
            }
            Event::End(Tag::Link(..)) => {
                if let Some(url) = link_target.take() {
                    if !buffer.ends_with(url.as_str()) {
                        buffer.push_str(&format!(" ({})", url));
                    }
                }
            }
            Event::Text(t) => buffer.push_str(&t),
            Event::Code(t) => {
                buffer.push('`');
                buffer.push_str(&t);
                buffer.push('`');
            }
            Event::SoftBreak => buffer.push(' '),
            Event::HardBreak => buffer.push('\n'),
            Event::TaskListMarker(done) => {
                buffer.push_str(if done { "[x] " } else { "[ ] " });
            }
            Event::Rule => {
                flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
                blocks.push(Block::Rule);
            }
            Event::Html(t) => buffer.push_str(&t),
            _ => {}
        }
    }

    // Unterminated fence at the end of a streamed answer.
    if let Some((language, body)) = code.take() {
        blocks.push(Block::Code {
            language,
            code: body.trim_end_matches('\n').to_string(),
        });
    }
    flush(&mut buffer, &mut blocks, &lists, &mut item_marker, quote_depth);
    blocks
}
