//! XQuery prolog declarations: namespaces, defaults, variables, functions,
//! module declarations and module imports.

use super::Parser;
use crate::prolog::{
    BoundarySpace, ConstructionMode, CopyNamespaces, DecimalFormat, EmptyOrder, ModuleImport,
    OrderingMode, VariableDecl, XQueryFunction, function_key,
};
use crate::tokenizer::TokenKind;
use std::rc::Rc;

impl<'a> Parser<'a> {
    pub(super) fn parse_prolog(&mut self) {
        // `xquery version "1.0" [encoding "..."] ;`
        if self.check_keyword("xquery") && self.peek_text(1) == "version" {
            self.advance();
            self.advance();
            if self.check(TokenKind::String) {
                self.advance();
            } else {
                self.error("expected a version string after 'xquery version'".to_string());
            }
            if self.match_keyword("encoding") && self.check(TokenKind::String) {
                self.advance();
            }
            self.expect(TokenKind::Semicolon, "';' ending the version declaration");
        }

        if self.check_keyword("module") && self.peek_text(1) == "namespace" {
            self.parse_module_declaration();
        }

        loop {
            if self.check_keyword("declare") {
                if !self.parse_declare() {
                    break;
                }
            } else if self.check_keyword("import")
                && matches!(self.peek_text(1), "module" | "schema")
            {
                self.parse_import();
            } else {
                break;
            }
        }
    }

    fn parse_module_declaration(&mut self) {
        self.advance(); // module
        self.advance(); // namespace
        let Some(prefix) = self.parse_qname_text() else {
            return;
        };
        self.expect(TokenKind::Equals, "'=' in module declaration");
        if self.check(TokenKind::String) {
            let uri = self.advance().text().to_string();
            self.prolog.is_library_module = true;
            self.prolog.module_namespace_uri = Some(uri.clone());
            self.prolog.module_prefix = Some(prefix.clone());
            self.prolog.declare_namespace(&prefix, &uri);
        } else {
            self.error("expected a namespace URI string in module declaration".to_string());
        }
        self.expect(TokenKind::Semicolon, "';' ending the module declaration");
    }

    /// Returns false when the `declare` keyword does not begin a recognised
    /// declaration (it may be a path step).
    fn parse_declare(&mut self) -> bool {
        match self.peek_text(1) {
            "namespace" => {
                self.advance();
                self.advance();
                self.parse_namespace_declaration();
            }
            "default" => {
                self.advance();
                self.advance();
                self.parse_default_declaration();
            }
            "variable" => {
                self.advance();
                self.advance();
                self.parse_variable_declaration();
            }
            "function" => {
                self.advance();
                self.advance();
                self.parse_function_declaration();
            }
            "boundary-space" => {
                self.advance();
                self.advance();
                if self.match_keyword("preserve") {
                    self.prolog.boundary_space = BoundarySpace::Preserve;
                } else if self.match_keyword("strip") {
                    self.prolog.boundary_space = BoundarySpace::Strip;
                } else {
                    self.error("expected 'preserve' or 'strip'".to_string());
                }
                self.expect(TokenKind::Semicolon, "';'");
            }
            "construction" => {
                self.advance();
                self.advance();
                if self.match_keyword("preserve") {
                    self.prolog.construction_mode = ConstructionMode::Preserve;
                } else if self.match_keyword("strip") {
                    self.prolog.construction_mode = ConstructionMode::Strip;
                } else {
                    self.error("expected 'preserve' or 'strip'".to_string());
                }
                self.expect(TokenKind::Semicolon, "';'");
            }
            "ordering" => {
                self.advance();
                self.advance();
                if self.match_keyword("ordered") {
                    self.prolog.ordering_mode = OrderingMode::Ordered;
                } else if self.match_keyword("unordered") {
                    self.prolog.ordering_mode = OrderingMode::Unordered;
                } else {
                    self.error("expected 'ordered' or 'unordered'".to_string());
                }
                self.expect(TokenKind::Semicolon, "';'");
            }
            "copy-namespaces" => {
                self.advance();
                self.advance();
                let preserve = if self.match_keyword("preserve") {
                    true
                } else if self.match_keyword("no-preserve") {
                    false
                } else {
                    self.error("expected 'preserve' or 'no-preserve'".to_string());
                    true
                };
                self.expect(TokenKind::Comma, "',' in copy-namespaces declaration");
                let inherit = if self.match_keyword("inherit") {
                    true
                } else if self.match_keyword("no-inherit") {
                    false
                } else {
                    self.error("expected 'inherit' or 'no-inherit'".to_string());
                    true
                };
                self.prolog.copy_namespaces = CopyNamespaces { preserve, inherit };
                self.expect(TokenKind::Semicolon, "';'");
            }
            "base-uri" => {
                self.advance();
                self.advance();
                if self.check(TokenKind::String) {
                    self.prolog.static_base_uri = Some(self.advance().text().to_string());
                } else {
                    self.error("expected a URI string after 'declare base-uri'".to_string());
                }
                self.expect(TokenKind::Semicolon, "';'");
            }
            "decimal-format" => {
                self.advance();
                self.advance();
                let name = self.parse_qname_text();
                self.parse_decimal_format(name);
            }
            _ => return false,
        }
        true
    }

    fn parse_namespace_declaration(&mut self) {
        let Some(prefix) = self.parse_qname_text() else {
            return;
        };
        if prefix == "xml" || prefix == "xmlns" {
            self.error(format!("prefix '{prefix}' cannot be redeclared"));
        }
        self.expect(TokenKind::Equals, "'=' in namespace declaration");
        if self.check(TokenKind::String) {
            let uri = self.advance().text().to_string();
            if !(prefix == "xml" || prefix == "xmlns") {
                self.prolog.declare_namespace(&prefix, &uri);
            }
        } else {
            self.error("expected a namespace URI string".to_string());
        }
        self.expect(TokenKind::Semicolon, "';' ending the namespace declaration");
    }

    fn parse_default_declaration(&mut self) {
        if self.match_keyword("element") {
            if !self.match_keyword("namespace") {
                self.error("expected 'namespace' after 'declare default element'".to_string());
            }
            if self.check(TokenKind::String) {
                self.prolog.default_element_namespace = Some(self.advance().text().to_string());
            } else {
                self.error("expected a namespace URI string".to_string());
            }
        } else if self.match_keyword("function") {
            if !self.match_keyword("namespace") {
                self.error("expected 'namespace' after 'declare default function'".to_string());
            }
            if self.check(TokenKind::String) {
                self.prolog.default_function_namespace = Some(self.advance().text().to_string());
            } else {
                self.error("expected a namespace URI string".to_string());
            }
        } else if self.match_keyword("collation") {
            if self.check(TokenKind::String) {
                self.prolog.default_collation = Some(self.advance().text().to_string());
            } else {
                self.error("expected a collation URI string".to_string());
            }
        } else if self.match_keyword("order") {
            if !self.match_keyword("empty") {
                self.error("expected 'empty' after 'declare default order'".to_string());
            }
            if self.match_keyword("greatest") {
                self.prolog.empty_order = EmptyOrder::Greatest;
            } else if self.match_keyword("least") {
                self.prolog.empty_order = EmptyOrder::Least;
            } else {
                self.error("expected 'greatest' or 'least'".to_string());
            }
        } else if self.match_keyword("decimal-format") {
            self.parse_decimal_format(None);
            return;
        } else {
            let found = self.current_text();
            self.error(format!("unknown default declaration '{found}'"));
        }
        self.expect(TokenKind::Semicolon, "';' ending the declaration");
    }

    fn parse_decimal_format(&mut self, name: Option<String>) {
        let mut format = DecimalFormat::default();
        while self.check(TokenKind::Identifier) && self.peek_kind(1) == TokenKind::Equals {
            let property = self.advance().text().to_string();
            self.advance(); // =
            if !self.check(TokenKind::String) {
                self.error(format!("expected a string value for '{property}'"));
                break;
            }
            let value = self.advance().text().to_string();
            let first_char = value.chars().next().unwrap_or(' ');
            match property.as_str() {
                "decimal-separator" => format.decimal_separator = first_char,
                "grouping-separator" => format.grouping_separator = first_char,
                "infinity" => format.infinity = value,
                "minus-sign" => format.minus_sign = first_char,
                "NaN" => format.nan = value,
                "percent" => format.percent = first_char,
                "per-mille" => format.per_mille = first_char,
                "zero-digit" => format.zero_digit = first_char,
                "digit" => format.digit = first_char,
                "pattern-separator" => format.pattern_separator = first_char,
                _ => self.error(format!("unknown decimal-format property '{property}'")),
            }
        }
        if self.prolog.decimal_formats.insert(name.clone(), format).is_some() {
            let label = name.unwrap_or_else(|| "(default)".to_string());
            self.error(format!("duplicate decimal-format declaration '{label}'"));
        }
        self.expect(TokenKind::Semicolon, "';' ending the decimal-format declaration");
    }

    /// Skip an `as SequenceType` annotation; the engine is schema-typed, not
    /// statically typed, so the annotation only has to be consumed.
    fn skip_type_annotation(&mut self) {
        if !self.match_keyword("as") {
            return;
        }
        let mut depth = 0u32;
        loop {
            match self.current_kind() {
                TokenKind::LParen => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RParen => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                TokenKind::Comma | TokenKind::Semicolon | TokenKind::LBrace | TokenKind::Assign
                    if depth == 0 =>
                {
                    return;
                }
                TokenKind::Identifier if depth == 0 && self.current().text() == "external" => {
                    return;
                }
                TokenKind::End => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_variable_declaration(&mut self) {
        if !self.expect(TokenKind::Dollar, "'$' in variable declaration") {
            return;
        }
        let Some(qname) = self.parse_qname_text() else {
            return;
        };
        self.skip_type_annotation();
        let (ns_uri, local) = self.prolog.expand_variable_name(&qname);

        let declaration = if self.match_kind(TokenKind::Assign) {
            let initializer = self.parse_single_expr();
            VariableDecl {
                ns_uri: ns_uri.clone(),
                local: local.clone(),
                initializer: Some(Rc::new(initializer)),
                external: false,
            }
        } else if self.match_keyword("external") {
            VariableDecl { ns_uri: ns_uri.clone(), local: local.clone(), initializer: None, external: true }
        } else {
            let found = self.current_text();
            self.error(format!("expected ':=' or 'external' in variable declaration, found '{found}'"));
            return;
        };

        let key = crate::prolog::expanded_key(ns_uri.as_deref(), &local);
        if self.prolog.variables.insert(key, declaration).is_some() {
            self.error(format!("duplicate variable declaration '${qname}'"));
        }
        self.expect(TokenKind::Semicolon, "';' ending the variable declaration");
    }

    fn parse_function_declaration(&mut self) {
        let Some(qname) = self.parse_qname_text() else {
            return;
        };
        let (ns_uri, local) = self.prolog.expand_function_name(&qname);

        let mut params: Vec<String> = Vec::new();
        self.expect(TokenKind::LParen, "'(' opening the parameter list");
        if !self.check(TokenKind::RParen) {
            loop {
                if !self.expect(TokenKind::Dollar, "'$' before a parameter name") {
                    break;
                }
                let Some(param) = self.parse_qname_text() else {
                    break;
                };
                self.skip_type_annotation();
                let (param_ns, param_local) = self.prolog.expand_variable_name(&param);
                params.push(crate::prolog::expanded_key(param_ns.as_deref(), &param_local));
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' closing the parameter list");
        self.skip_type_annotation();

        self.expect(TokenKind::LBrace, "'{' opening the function body");
        let body = self.parse_expr();
        self.expect(TokenKind::RBrace, "'}' closing the function body");

        let key = function_key(ns_uri.as_deref(), &local, params.len());
        let function =
            XQueryFunction { ns_uri, local: local.clone(), params, body: Rc::new(body) };
        if self.prolog.functions.insert(key, Rc::new(function)).is_some() {
            self.error(format!("duplicate function declaration '{qname}'"));
        }
        self.expect(TokenKind::Semicolon, "';' ending the function declaration");
    }

    fn parse_import(&mut self) {
        self.advance(); // import
        if self.match_keyword("schema") {
            self.error("schema import is not supported".to_string());
            while !self.check(TokenKind::Semicolon) && !self.check(TokenKind::End) {
                self.advance();
            }
            self.match_kind(TokenKind::Semicolon);
            return;
        }
        self.advance(); // module
        let mut prefix = None;
        if self.match_keyword("namespace") {
            prefix = self.parse_qname_text();
            self.expect(TokenKind::Equals, "'=' in module import");
        }
        if !self.check(TokenKind::String) {
            self.error("expected a target namespace string in module import".to_string());
            return;
        }
        let target = self.advance().text().to_string();
        if self.prolog.has_module_import(&target) {
            self.error(format!("XQST0047: duplicate import of module '{target}'"));
        }
        if let Some(prefix) = &prefix {
            self.prolog.declare_namespace(prefix, &target);
        }
        let mut hints = Vec::new();
        if self.match_keyword("at") {
            loop {
                if self.check(TokenKind::String) {
                    hints.push(self.advance().text().to_string());
                } else {
                    self.error("expected a location hint string".to_string());
                    break;
                }
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.prolog.module_imports.push(ModuleImport {
            prefix,
            target_namespace: target,
            location_hints: hints,
        });
        self.expect(TokenKind::Semicolon, "';' ending the module import");
    }
}
