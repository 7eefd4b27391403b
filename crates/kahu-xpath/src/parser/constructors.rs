//! XQuery node constructors.
//!
//! Direct constructors are scanned from the raw source (the flat token
//! stream cannot represent element content); the token cursor is
//! re-synchronised past the constructor afterwards. Computed constructors
//! parse from tokens like any other expression.

use super::Parser;
use crate::ast::{AstKind, AstNode, AvtPart, ConstructorAttribute, ConstructorInfo};
use crate::tokenizer::TokenKind;
use smallvec::SmallVec;

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'&' {
            if let Some(end) = text[idx..].find(';') {
                let entity = &text[idx + 1..idx + end];
                let decoded = match entity {
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "amp" => Some('&'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    _ => entity.strip_prefix("#x").and_then(|hex| {
                        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                    }).or_else(|| {
                        entity.strip_prefix('#').and_then(|dec| {
                            dec.parse::<u32>().ok().and_then(char::from_u32)
                        })
                    }),
                };
                if let Some(ch) = decoded {
                    out.push(ch);
                    idx += end + 1;
                    continue;
                }
            }
        }
        let ch_end = (idx + 1..=bytes.len())
            .find(|&e| text.is_char_boundary(e))
            .unwrap_or(bytes.len());
        out.push_str(&text[idx..ch_end]);
        idx = ch_end;
    }
    out
}

fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

struct RawScanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> RawScanner<'a> {
    fn peek(&self, offset: usize) -> u8 {
        *self.source.as_bytes().get(self.pos + offset).unwrap_or(&0)
    }

    fn starts_with(&self, needle: &str) -> bool {
        self.source[self.pos.min(self.source.len())..].starts_with(needle)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(0), b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    /// QName: NCName with an optional single `prefix:` part.
    fn scan_qname(&mut self) -> Option<&'a str> {
        let start = self.pos;
        if !is_name_start(self.peek(0)) {
            return None;
        }
        self.pos += 1;
        while is_name_byte(self.peek(0)) {
            self.pos += 1;
        }
        if self.peek(0) == b':' && is_name_start(self.peek(1)) {
            self.pos += 2;
            while is_name_byte(self.peek(0)) {
                self.pos += 1;
            }
        }
        Some(&self.source[start..self.pos])
    }

    /// Advance past a balanced `{ ... }` block, honouring string literals.
    /// Returns the span of the enclosed expression (without braces).
    fn scan_enclosed(&mut self) -> Option<(usize, usize)> {
        debug_assert_eq!(self.peek(0), b'{');
        self.pos += 1;
        let start = self.pos;
        let mut depth = 1u32;
        let mut quote: u8 = 0;
        while self.pos < self.source.len() {
            let byte = self.peek(0);
            if quote != 0 {
                if byte == quote {
                    quote = 0;
                }
                self.pos += 1;
                continue;
            }
            match byte {
                b'\'' | b'"' => quote = byte,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = self.pos;
                        self.pos += 1;
                        return Some((start, end));
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }
}

impl<'a> Parser<'a> {
    /// Entry point when the token stream sits on the `<` of a direct element
    /// constructor.
    pub(super) fn parse_direct_constructor(&mut self) -> AstNode {
        let start = self.current().offset - self.base;
        let mut scanner = RawScanner { source: self.source, pos: start };
        let node = self.scan_element(&mut scanner);
        let end = scanner.pos;
        self.resync_to(end);
        match node {
            Some(node) => node,
            None => AstNode::new(AstKind::Expression, ""),
        }
    }

    fn enclosed_fragment(&mut self, start: usize, end: usize) -> AstNode {
        let fragment = Parser::fragment(&self.source[start..end], self.base + start);
        let output = fragment.parse_query();
        self.errors.extend(output.errors);
        output.ast.unwrap_or_else(|| AstNode::new(AstKind::Expression, ""))
    }

    fn scan_avt(&mut self, scanner: &mut RawScanner<'a>, quote: u8) -> Option<Vec<AvtPart>> {
        let mut parts: SmallVec<[AvtPart; 4]> = SmallVec::new();
        let mut literal = String::new();
        loop {
            let byte = scanner.peek(0);
            if byte == 0 {
                self.error("unterminated attribute value in constructor".to_string());
                return None;
            }
            if byte == quote {
                scanner.pos += 1;
                break;
            }
            if byte == b'{' {
                if scanner.peek(1) == b'{' {
                    literal.push('{');
                    scanner.pos += 2;
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(AvtPart::Literal(decode_entities(&literal)));
                    literal.clear();
                }
                let Some((start, end)) = scanner.scan_enclosed() else {
                    self.error("unterminated '{' in attribute value template".to_string());
                    return None;
                };
                parts.push(AvtPart::Expr(self.enclosed_fragment(start, end)));
                continue;
            }
            if byte == b'}' {
                if scanner.peek(1) == b'}' {
                    literal.push('}');
                    scanner.pos += 2;
                    continue;
                }
                self.error("unescaped '}' in attribute value template".to_string());
                scanner.pos += 1;
                continue;
            }
            let ch_start = scanner.pos;
            let mut ch_end = scanner.pos + 1;
            while ch_end < scanner.source.len() && !scanner.source.is_char_boundary(ch_end) {
                ch_end += 1;
            }
            literal.push_str(&scanner.source[ch_start..ch_end]);
            scanner.pos = ch_end;
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Literal(decode_entities(&literal)));
        }
        Some(parts.into_vec())
    }

    fn scan_element(&mut self, scanner: &mut RawScanner<'a>) -> Option<AstNode> {
        if scanner.peek(0) != b'<' {
            self.error("expected '<' to open a direct constructor".to_string());
            return None;
        }
        scanner.pos += 1;
        let Some(name) = scanner.scan_qname() else {
            self.error("expected an element name after '<'".to_string());
            return None;
        };
        let name = name.to_string();
        let mut info = ConstructorInfo::default();
        let mut node = AstNode::new(AstKind::DirectElementConstructor, name.clone());

        // Attribute list
        loop {
            scanner.skip_whitespace();
            if scanner.starts_with("/>") {
                scanner.pos += 2;
                node.constructor = Some(Box::new(info));
                return Some(node);
            }
            if scanner.peek(0) == b'>' {
                scanner.pos += 1;
                break;
            }
            let Some(attr_name) = scanner.scan_qname() else {
                self.error(format!("malformed attribute list in <{name}>"));
                return None;
            };
            let attr_name = attr_name.to_string();
            scanner.skip_whitespace();
            if scanner.peek(0) != b'=' {
                self.error(format!("expected '=' after attribute '{attr_name}'"));
                return None;
            }
            scanner.pos += 1;
            scanner.skip_whitespace();
            let quote = scanner.peek(0);
            if quote != b'\'' && quote != b'"' {
                self.error(format!("expected a quoted value for attribute '{attr_name}'"));
                return None;
            }
            scanner.pos += 1;
            let value = self.scan_avt(scanner, quote)?;
            let (prefix, local) = match attr_name.split_once(':') {
                Some((p, l)) => (p.to_string(), l.to_string()),
                None => (String::new(), attr_name.clone()),
            };
            let is_namespace_decl = attr_name == "xmlns" || prefix == "xmlns";
            info.attributes.push(ConstructorAttribute { prefix, local, is_namespace_decl, value });
        }

        // Content
        let mut literal = String::new();
        loop {
            if scanner.pos >= scanner.source.len() {
                self.error(format!("unterminated element constructor <{name}>"));
                return None;
            }
            if scanner.starts_with("</") {
                Self::flush_literal(&mut node, &mut literal, true);
                scanner.pos += 2;
                let close = scanner.scan_qname().unwrap_or("");
                if close != name {
                    self.error(format!("mismatched closing tag </{close}> for <{name}>"));
                }
                scanner.skip_whitespace();
                if scanner.peek(0) == b'>' {
                    scanner.pos += 1;
                } else {
                    self.error(format!("expected '>' after closing tag </{close}>"));
                }
                node.constructor = Some(Box::new(info));
                return Some(node);
            }
            if scanner.starts_with("<!--") {
                Self::flush_literal(&mut node, &mut literal, true);
                scanner.pos += 4;
                let rest = &scanner.source[scanner.pos..];
                let Some(end) = rest.find("-->") else {
                    self.error("unterminated comment in constructor content".to_string());
                    return None;
                };
                let text = rest[..end].to_string();
                scanner.pos += end + 3;
                let mut comment = AstNode::new(AstKind::CommentConstructor, "");
                comment.add_child(AstNode::new(AstKind::ConstructorContent, text));
                node.add_child(comment);
                continue;
            }
            if scanner.starts_with("<![CDATA[") {
                Self::flush_literal(&mut node, &mut literal, true);
                scanner.pos += 9;
                let rest = &scanner.source[scanner.pos..];
                let Some(end) = rest.find("]]>") else {
                    self.error("unterminated CDATA section in constructor content".to_string());
                    return None;
                };
                let text = rest[..end].to_string();
                scanner.pos += end + 3;
                // CDATA text is literal; entities stay undecoded.
                node.add_child(AstNode::new(AstKind::ConstructorContent, text));
                continue;
            }
            if scanner.starts_with("<?") {
                Self::flush_literal(&mut node, &mut literal, true);
                scanner.pos += 2;
                let target = scanner.scan_qname().unwrap_or("").to_string();
                let rest = &scanner.source[scanner.pos..];
                let Some(end) = rest.find("?>") else {
                    self.error("unterminated processing instruction in constructor".to_string());
                    return None;
                };
                let text = rest[..end].trim_start().to_string();
                scanner.pos += end + 2;
                let mut pi = AstNode::new(AstKind::PiConstructor, target);
                pi.add_child(AstNode::new(AstKind::ConstructorContent, text));
                node.add_child(pi);
                continue;
            }
            if scanner.peek(0) == b'<' {
                Self::flush_literal(&mut node, &mut literal, true);
                let child = self.scan_element(scanner)?;
                node.add_child(child);
                continue;
            }
            if scanner.peek(0) == b'{' {
                if scanner.peek(1) == b'{' {
                    literal.push('{');
                    scanner.pos += 2;
                    continue;
                }
                Self::flush_literal(&mut node, &mut literal, true);
                let Some((start, end)) = scanner.scan_enclosed() else {
                    self.error("unterminated '{' in element content".to_string());
                    return None;
                };
                let expr = self.enclosed_fragment(start, end);
                node.add_child(AstNode::with_children(AstKind::Expression, "", vec![expr]));
                continue;
            }
            if scanner.peek(0) == b'}' && scanner.peek(1) == b'}' {
                literal.push('}');
                scanner.pos += 2;
                continue;
            }
            let ch_start = scanner.pos;
            let mut ch_end = scanner.pos + 1;
            while ch_end < scanner.source.len() && !scanner.source.is_char_boundary(ch_end) {
                ch_end += 1;
            }
            literal.push_str(&scanner.source[ch_start..ch_end]);
            scanner.pos = ch_end;
        }
    }

    fn flush_literal(node: &mut AstNode, literal: &mut String, decode: bool) {
        if literal.is_empty() {
            return;
        }
        let text = if decode { decode_entities(literal) } else { literal.clone() };
        literal.clear();
        node.add_child(AstNode::new(AstKind::ConstructorContent, text));
    }

    /// `element {name}? { content }`, `attribute ...`, `text { ... }`,
    /// `comment { ... }`, `processing-instruction ...`, `document { ... }`.
    pub(super) fn parse_computed_constructor(&mut self) -> AstNode {
        let keyword = self.advance().text().to_string();
        let kind = match keyword.as_str() {
            "element" => AstKind::ComputedElementConstructor,
            "attribute" => AstKind::ComputedAttributeConstructor,
            "text" => AstKind::TextConstructor,
            "comment" => AstKind::CommentConstructor,
            "processing-instruction" => AstKind::PiConstructor,
            _ => AstKind::DocumentConstructor,
        };
        let mut node = AstNode::new(kind, "");
        let mut info = ConstructorInfo::default();

        if matches!(
            kind,
            AstKind::ComputedElementConstructor
                | AstKind::ComputedAttributeConstructor
                | AstKind::PiConstructor
        ) {
            if self.check(TokenKind::Identifier) {
                node.value = self.parse_qname_text().unwrap_or_default();
            } else if self.check(TokenKind::LBrace) {
                self.advance();
                let name_expr = self.parse_expr();
                self.expect(TokenKind::RBrace, "'}' closing the name expression");
                info.has_name_expression = true;
                node.add_child(name_expr);
            } else {
                let found = self.current_text();
                self.error(format!("expected a name or '{{' after '{keyword}', found '{found}'"));
            }
        }

        self.expect(TokenKind::LBrace, "'{' opening the constructor body");
        if !self.check(TokenKind::RBrace) {
            let content = self.parse_expr();
            node.add_child(content);
        }
        self.expect(TokenKind::RBrace, "'}' closing the constructor body");
        node.constructor = Some(Box::new(info));
        node
    }
}
