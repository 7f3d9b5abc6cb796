//! Body flattening.
//!
//! The body container is walked once, depth first, and turned into a flat
//! list of [`Block`]s:
//!
//! | Node | Block |
//! |------|-------|
//! | removal selector match (`script`, `style`, promos) | skipped with its subtree |
//! | embed selector match (`blockquote`) | [`Block::Embed`] with the outer markup |
//! | `br` | [`Block::Break`] |
//! | `p`, `h1`–`h6`, `li` | one [`Block::Text`] per line |
//! | `li` holding an embed | descended |
//! | any other element with block-level children | descended |
//! | any other element | one [`Block::Text`] per line |
//!
//! Leaf elements are read once and never descended, so nested markup does
//! not produce the same sentence twice.

use super::rules::Rules;
use crate::utils::collapse_whitespace;
use scraper::{ElementRef, Node};

const LEAF_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "aside", "blockquote", "figure",
    "ul", "ol", "li", "table", "br", "h1", "h2", "h3", "h4", "h5", "h6",
];

const SKIPPED_TAGS: &[&str] = &["img", "picture", "svg", "noscript", "iframe"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Whitespace-normalized plain text.
    Text(String),
    /// Markup kept verbatim.
    Embed(String),
    /// A line break in the source.
    Break,
}

struct Flattener<'r> {
    rules: &'r Rules,
    blocks: Vec<Block>,
}

impl Flattener<'_> {
    fn push_break(&mut self) {
        if matches!(self.blocks.last(), Some(Block::Text(_) | Block::Embed(_))) {
            self.blocks.push(Block::Break);
        }
    }

    /// Push text, splitting on `\n`. Source newlines are plain whitespace in
    /// HTML, so callers only pass `\n` where a `br` stood.
    fn push_text(&mut self, raw: &str) {
        let mut first = true;
        for line in raw.split('\n') {
            if !first {
                self.push_break();
            }
            first = false;
            let line = collapse_whitespace(line);
            if !line.is_empty() {
                self.blocks.push(Block::Text(line));
            }
        }
    }

    fn visit_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(&text.replace('\n', " ")),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.visit(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit(&mut self, el: ElementRef<'_>) {
        if self.rules.is_removed(&el) {
            return;
        }
        if self.rules.embed.matches(&el) {
            self.blocks.push(Block::Embed(el.html()));
            return;
        }

        let name = el.value().name();
        if name == "br" {
            self.push_break();
        } else if SKIPPED_TAGS.contains(&name) {
            // media is collected separately
        } else if self.is_leaf(el) {
            let text = self.inline_text(el);
            self.push_text(&text);
        } else {
            self.visit_children(el);
        }
    }

    /// Read as one piece of text. A list item holding an embed is walked
    /// instead, so the embed keeps its markup.
    fn is_leaf(&self, el: ElementRef<'_>) -> bool {
        match el.value().name() {
            "li" => el.select(&self.rules.embed).next().is_none(),
            name if LEAF_TAGS.contains(&name) => true,
            _ => !self.has_block_children(el),
        }
    }

    fn has_block_children(&self, el: ElementRef<'_>) -> bool {
        el.children().filter_map(ElementRef::wrap).any(|child| {
            BLOCK_TAGS.contains(&child.value().name()) || self.rules.embed.matches(&child)
        })
    }

    /// Text of `el` with removal subtrees skipped and `br` as `\n`.
    fn inline_text(&self, el: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.collect_inline(el, &mut out);
        out
    }

    fn collect_inline(&self, el: ElementRef<'_>, out: &mut String) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(&text.replace('\n', " ")),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if self.rules.is_removed(&child_el) {
                        continue;
                    }
                    if child_el.value().name() == "br" {
                        out.push('\n');
                    } else {
                        self.collect_inline(child_el, out);
                    }
                }
                _ => {}
            }
        }
    }
}

/// Flatten the content of `container` into blocks.
pub fn flatten(container: ElementRef<'_>, rules: &Rules) -> Vec<Block> {
    let mut flattener = Flattener {
        rules,
        blocks: Vec::new(),
    };
    flattener.visit_children(container);
    while matches!(flattener.blocks.last(), Some(Block::Break)) {
        flattener.blocks.pop();
    }
    flattener.blocks
}

/// Body text: one line per block, a blank line per break.
pub fn body_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::Text(s) | Block::Embed(s) => s.as_str(),
            Block::Break => "",
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain prose only, with embeds left out.
pub fn prose_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
