//! Static enumeration of a module's top-level export names.
//!
//! The scanner works on JavaScript / TypeScript source without evaluating
//! it: a small lexer drops comments and the contents of string, template and
//! regular expression literals, then the top-level `export` statements are
//! read from the token stream. Type-only exports produce no runtime binding
//! and are skipped. `export * from "..."` cannot be enumerated statically and
//! is reported as the name `*`.

/// Name reported for a star re-export whose bindings are unknown.
pub const STAR_REEXPORT: &str = "*";

const STATEMENT_KEYWORDS: &[&str] = &["export", "import", "const", "let", "var"];

// Keywords after which a `/` starts a regular expression literal.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "yield", "await",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Punct(char),
    Other,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// Brace depth at the token; an opening brace carries the outer depth.
    depth: usize,
}

/// Exports declared by one module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleExports {
    /// Names bound by this module, in declaration order, deduplicated.
    pub names: Vec<String>,
    /// Specifiers of `export * from` statements, in order.
    pub star_sources: Vec<String>,
}

/// Top-level export names of `source`. Each star re-export is reported as
/// [`STAR_REEXPORT`].
pub fn scan_exports(source: &str) -> Vec<String> {
    let module = scan_module(source);
    let mut names = module.names;
    if !module.star_sources.is_empty() && !names.iter().any(|name| name == STAR_REEXPORT) {
        names.push(STAR_REEXPORT.to_string());
    }
    names
}

/// Top-level exports of `source`, keeping star re-export specifiers apart.
pub fn scan_module(source: &str) -> ModuleExports {
    let tokens = tokenize(source);
    let mut names = Vec::new();
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        star_sources: Vec::new(),
    };

    while parser.pos < tokens.len() {
        let token = &tokens[parser.pos];
        let preceded_by_dot = parser.pos > 0 && tokens[parser.pos - 1].kind == TokenKind::Punct('.');
        parser.pos += 1;

        if token.depth == 0 && !preceded_by_dot && is_ident(&token.kind, "export") {
            parser.parse_export(&mut names);
        }
    }

    let mut seen = std::collections::HashSet::new();
    names.retain(|name| seen.insert(name.clone()));
    ModuleExports {
        names,
        star_sources: parser.star_sources,
    }
}

fn is_ident(kind: &TokenKind, word: &str) -> bool {
    matches!(kind, TokenKind::Ident(ident) if ident == word)
}

fn tokenize(source: &str) -> Vec<Token> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i += 2;
            continue;
        }

        let kind = if c == '"' || c == '\'' {
            let (value, end) = read_string(&chars, i, c);
            i = end;
            TokenKind::Str(value)
        } else if c == '`' {
            i = skip_template(&chars, i);
            TokenKind::Other
        } else if c == '/' && regex_allowed(tokens.last()) {
            i = skip_regex(&chars, i);
            TokenKind::Other
        } else if is_ident_start(c) {
            let start = i;
            while i < chars.len() && is_ident_part(chars[i]) {
                i += 1;
            }
            TokenKind::Ident(chars[start..i].iter().collect())
        } else if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            TokenKind::Other
        } else {
            i += 1;
            TokenKind::Punct(c)
        };

        match kind {
            TokenKind::Punct('{') => {
                tokens.push(Token { kind, depth });
                depth += 1;
            }
            TokenKind::Punct('}') => {
                depth = depth.saturating_sub(1);
                tokens.push(Token { kind, depth });
            }
            kind => tokens.push(Token { kind, depth }),
        }
    }

    tokens
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn read_string(chars: &[char], start: usize, quote: char) -> (String, usize) {
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if let Some(&escaped) = chars.get(i + 1) {
                    value.push(escaped);
                }
                i += 2;
            }
            c if c == quote => return (value, i + 1),
            '\n' => return (value, i),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    (value, i)
}

fn skip_template(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return i + 1,
            '$' if chars.get(i + 1) == Some(&'{') => {
                let mut nested = 1;
                i += 2;
                while i < chars.len() && nested > 0 {
                    match chars[i] {
                        '{' => nested += 1,
                        '}' => nested -= 1,
                        '`' => {
                            i = skip_template(chars, i);
                            continue;
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    i
}

fn regex_allowed(previous: Option<&Token>) -> bool {
    match previous.map(|token| &token.kind) {
        None => true,
        Some(TokenKind::Punct(c)) => "(,=:[!&|?{};+-*%<>~^".contains(*c),
        Some(TokenKind::Ident(word)) => REGEX_PREFIX_KEYWORDS.contains(&word.as_str()),
        Some(_) => false,
    }
}

fn skip_regex(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => break,
            '\n' => return i,
            _ => {}
        }
        i += 1;
    }
    i += 1;
    while i < chars.len() && is_ident_part(chars[i]) {
        i += 1;
    }
    i
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    star_sources: Vec<String>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos).map(|token| &token.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.pos + offset).map(|token| &token.kind)
    }

    fn bump(&mut self) -> Option<&'a TokenKind> {
        let kind = self.tokens.get(self.pos).map(|token| &token.kind);
        self.pos += 1;
        kind
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&TokenKind::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.peek().is_some_and(|kind| is_ident(kind, word)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<String> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        }
    }

    fn module_export_name(&mut self) -> Option<String> {
        match self.peek() {
            Some(TokenKind::Ident(name)) | Some(TokenKind::Str(name)) => {
                let name = name.clone();
                self.pos += 1;
                Some(name)
            }
            _ => None,
        }
    }

    fn parse_export(&mut self, names: &mut Vec<String>) {
        let Some(kind) = self.peek().cloned() else {
            return;
        };

        match kind {
            TokenKind::Ident(word) => match word.as_str() {
                "default" => names.push("default".to_string()),
                // Type-only and ambient declarations have no runtime binding.
                "type" | "interface" | "declare" => {}
                "async" => {
                    self.pos += 1;
                    if self.eat_ident("function") {
                        self.function_name(names);
                    }
                }
                "function" => {
                    self.pos += 1;
                    self.function_name(names);
                }
                "abstract" => {
                    self.pos += 1;
                    if self.eat_ident("class") {
                        names.extend(self.ident());
                    }
                }
                "class" | "enum" | "namespace" | "module" => {
                    self.pos += 1;
                    names.extend(self.ident());
                }
                "import" => {
                    // `export import A = B.C`
                    self.pos += 1;
                    names.extend(self.ident());
                }
                "const" if self.peek_at(1).is_some_and(|kind| is_ident(kind, "enum")) => {
                    self.pos += 2;
                    names.extend(self.ident());
                }
                "const" | "let" | "var" => {
                    self.pos += 1;
                    self.declarations(names);
                }
                _ => {}
            },
            TokenKind::Punct('{') => {
                self.pos += 1;
                self.export_list(names);
            }
            TokenKind::Punct('*') => {
                self.pos += 1;
                if self.eat_ident("as") {
                    names.extend(self.module_export_name());
                } else {
                    self.eat_ident("from");
                    let source = match self.peek() {
                        Some(TokenKind::Str(source)) => {
                            self.pos += 1;
                            source.clone()
                        }
                        _ => String::new(),
                    };
                    self.star_sources.push(source);
                }
            }
            // `export = value`
            TokenKind::Punct('=') => names.push("default".to_string()),
            _ => {}
        }
    }

    fn function_name(&mut self, names: &mut Vec<String>) {
        self.eat_punct('*');
        names.extend(self.ident());
    }

    fn export_list(&mut self, names: &mut Vec<String>) {
        loop {
            if self.eat_punct('}') || self.peek().is_none() {
                return;
            }

            let type_only = self.peek().is_some_and(|kind| is_ident(kind, "type"))
                && matches!(self.peek_at(1), Some(TokenKind::Ident(next)) if next != "as");
            if type_only {
                self.pos += 1;
            }

            let Some(local) = self.module_export_name() else {
                self.pos += 1;
                continue;
            };
            let exported = if self.eat_ident("as") {
                self.module_export_name().unwrap_or(local)
            } else {
                local
            };
            if !type_only {
                names.push(exported);
            }

            self.eat_punct(',');
        }
    }

    fn declarations(&mut self, names: &mut Vec<String>) {
        loop {
            self.binding(names);
            if !self.skip_declarator_tail() {
                return;
            }
        }
    }

    /// Skip an optional type annotation and initializer. Returns `true` when
    /// another declarator follows.
    fn skip_declarator_tail(&mut self) -> bool {
        let mut nesting = 0usize;
        let mut angles = 0usize;
        let mut in_annotation = false;

        while let Some(kind) = self.peek() {
            match kind {
                // `=>` neither starts an initializer nor closes a type argument list.
                TokenKind::Punct('=') if self.peek_at(1) == Some(&TokenKind::Punct('>')) => {
                    self.pos += 1;
                }
                TokenKind::Punct('(' | '[' | '{') => nesting += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    if nesting == 0 {
                        return false;
                    }
                    nesting -= 1;
                }
                // Type arguments in an annotation, or generic parameters of an arrow function.
                TokenKind::Punct('<') if in_annotation || self.previous_is('=') => angles += 1,
                TokenKind::Punct('>') if angles > 0 => angles -= 1,
                TokenKind::Punct(':') if nesting == 0 && angles == 0 => in_annotation = true,
                TokenKind::Punct('=') if nesting == 0 && angles == 0 => in_annotation = false,
                TokenKind::Punct(',')
                    if nesting == 0 && angles == 0 && self.declarator_follows() =>
                {
                    self.pos += 1;
                    return true;
                }
                TokenKind::Punct(';') if nesting == 0 => {
                    self.pos += 1;
                    return false;
                }
                TokenKind::Ident(word)
                    if nesting == 0 && STATEMENT_KEYWORDS.contains(&word.as_str()) =>
                {
                    return false;
                }
                _ => {}
            }
            self.pos += 1;
        }
        false
    }

    fn previous_is(&self, c: char) -> bool {
        self.pos > 0 && self.tokens[self.pos - 1].kind == TokenKind::Punct(c)
    }

    /// Whether the `,` at the cursor separates declarators, i.e. it is followed
    /// by a binding and then `=`, `:`, `,`, `;` or the end of the statement.
    /// Commas between call type arguments (`f<A, B>()`) are not.
    fn declarator_follows(&self) -> bool {
        let mut offset = 1;
        match self.peek_at(offset) {
            Some(TokenKind::Ident(_)) => offset += 1,
            Some(TokenKind::Punct('{' | '[')) => {
                let mut nesting = 0usize;
                loop {
                    match self.peek_at(offset) {
                        None => return false,
                        Some(TokenKind::Punct('(' | '[' | '{')) => nesting += 1,
                        Some(TokenKind::Punct(')' | ']' | '}')) => {
                            nesting = nesting.saturating_sub(1);
                            if nesting == 0 {
                                offset += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    offset += 1;
                }
            }
            _ => return false,
        }

        match self.peek_at(offset) {
            None => true,
            Some(TokenKind::Punct('=' | ':' | ',' | ';')) => true,
            Some(TokenKind::Ident(word)) => STATEMENT_KEYWORDS.contains(&word.as_str()),
            _ => false,
        }
    }

    fn binding(&mut self, names: &mut Vec<String>) {
        if self.eat_punct('{') {
            self.object_pattern(names);
        } else if self.eat_punct('[') {
            self.array_pattern(names);
        } else {
            names.extend(self.ident());
        }
    }

    fn object_pattern(&mut self, names: &mut Vec<String>) {
        loop {
            if self.eat_punct('}') || self.peek().is_none() {
                return;
            }
            if self.eat_rest() {
                self.binding(names);
            } else if self.eat_punct('[') {
                // Computed key: `[expr]: target`
                self.skip_until_close(']');
                if self.eat_punct(':') {
                    self.binding(names);
                }
            } else {
                let key = match self.bump() {
                    Some(TokenKind::Ident(name)) => Some(name.clone()),
                    _ => None,
                };
                if self.eat_punct(':') {
                    self.binding(names);
                } else {
                    names.extend(key);
                }
            }
            self.skip_default('}');
            self.eat_punct(',');
        }
    }

    fn array_pattern(&mut self, names: &mut Vec<String>) {
        loop {
            if self.eat_punct(']') || self.peek().is_none() {
                return;
            }
            if self.eat_punct(',') {
                continue;
            }
            self.eat_rest();
            let before = self.pos;
            self.binding(names);
            if self.pos == before {
                self.pos += 1;
            }
            self.skip_default(']');
            self.eat_punct(',');
        }
    }

    fn eat_rest(&mut self) -> bool {
        let dots = (0..3).all(|offset| self.peek_at(offset) == Some(&TokenKind::Punct('.')));
        if dots {
            self.pos += 3;
        }
        dots
    }

    /// Skip a `= default` expression inside a pattern, stopping before `,` or `close`.
    fn skip_default(&mut self, close: char) {
        if !self.eat_punct('=') {
            return;
        }
        let mut nesting = 0usize;
        while let Some(kind) = self.peek() {
            match kind {
                TokenKind::Punct('(' | '[' | '{') => nesting += 1,
                TokenKind::Punct(c) if *c == close && nesting == 0 => return,
                TokenKind::Punct(')' | ']' | '}') => nesting = nesting.saturating_sub(1),
                TokenKind::Punct(',') if nesting == 0 => return,
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn skip_until_close(&mut self, close: char) {
        let mut nesting = 0usize;
        while let Some(kind) = self.bump() {
            match kind {
                TokenKind::Punct('(' | '[' | '{') => nesting += 1,
                TokenKind::Punct(c) if *c == close && nesting == 0 => return,
                TokenKind::Punct(')' | ']' | '}') => nesting = nesting.saturating_sub(1),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_and_const_exports() {
        let source = r#"
            import type { FnlyRequest } from "@fnly/core";

            export async function GET() {
                return { message: "hi" };
            }

            export const POST = async (req: FnlyRequest) => {
                return { statusCode: 201, body: req.body };
            };

            export function* PATCH() {}
            export let PUT = () => ({}), DELETE = () => ({})
            export var OPTIONS = function () {}
        "#;
        assert_eq!(
            scan_exports(source),
            vec!["GET", "POST", "PATCH", "PUT", "DELETE", "OPTIONS"]
        );
    }

    #[test]
    fn test_nested_exports_are_ignored() {
        let source = r#"
            export const GET = () => {
                const inner = { export: 1 };
                return inner.export;
            };
            namespace Hidden { export const NOPE = 1; }
        "#;
        assert_eq!(scan_exports(source), vec!["GET"]);
    }

    #[test]
    fn test_comments_and_strings_are_ignored() {
        let source = r#"
            // export const FOO = 1;
            /* export function BAR() {} */
            const text = "export const BAZ = 1";
            const tpl = `export const QUX = ${1 + 1} and ${"}"}`;
            const re = /export const RE = "/;
            export const GET = () => text + tpl + re;
        "#;
        assert_eq!(scan_exports(source), vec!["GET"]);
    }

    #[test]
    fn test_type_only_exports_are_skipped() {
        let source = r#"
            export type Body = { name: string };
            export interface Reply { ok: boolean }
            export declare const AMBIENT: number;
            export type { Other } from "./other";
            export { type Shape, GET };
        "#;
        assert_eq!(scan_exports(source), vec!["GET"]);
    }

    #[test]
    fn test_export_lists_and_aliases() {
        let source = r#"
            const get = () => ({});
            const post = () => ({});
            export { get as GET, post as POST };
            export { default as PUT, HEAD } from "./shared";
            export { handler as default };
        "#;
        assert_eq!(scan_exports(source), vec!["GET", "POST", "PUT", "HEAD", "default"]);
    }

    #[test]
    fn test_default_and_star_exports() {
        assert_eq!(scan_exports("export default function () {}"), vec!["default"]);
        assert_eq!(scan_exports("export * from './all';"), vec![STAR_REEXPORT]);
        assert_eq!(scan_exports("export * as utils from './utils';"), vec!["utils"]);
    }

    #[test]
    fn test_star_sources_are_kept_apart() {
        let module = scan_module(
            "export * from './_methods';\nexport const HEAD = () => ({});\nexport * from \"@shared/verbs\";",
        );
        assert_eq!(module.names, vec!["HEAD"]);
        assert_eq!(module.star_sources, vec!["./_methods", "@shared/verbs"]);
    }

    #[test]
    fn test_destructuring_declarations() {
        let source = r#"
            export const { GET, post: POST, nested: { PUT }, ...rest } = handlers;
            export const [PATCH, , HEAD = fallback] = list;
        "#;
        assert_eq!(
            scan_exports(source),
            vec!["GET", "POST", "PUT", "rest", "PATCH", "HEAD"]
        );
    }

    #[test]
    fn test_type_annotations_with_generics() {
        let source = r#"
            export const GET: Handler<Record<string, number>, Reply> = async () => ({})
            export class Store {}
            export enum Kind { A, B }
            export const enum Flag { X }
        "#;
        assert_eq!(scan_exports(source), vec!["GET", "Store", "Kind", "Flag"]);
    }

    #[test]
    fn test_generic_call_in_initializer() {
        let source = "export const GET = createHandler<Body, Reply>(async () => ({}));";
        assert_eq!(scan_exports(source), vec!["GET"]);

        let source = "export const GET = wrap<A, B>(x), POST = wrap<C, D>(y);";
        assert_eq!(scan_exports(source), vec!["GET", "POST"]);
    }

    #[test]
    fn test_function_type_annotation() {
        let source = r#"
            export const GET: (req: Req) => Promise<Record<string, unknown>> = async () => ({});
            export const POST: Handler<(req: Req) => Reply, Extra> = async () => ({});
        "#;
        assert_eq!(scan_exports(source), vec!["GET", "POST"]);
    }

    #[test]
    fn test_generic_arrow_initializer() {
        let source = "export const GET = <T, U = string>(req: T) => req, PUT = () => ({});";
        assert_eq!(scan_exports(source), vec!["GET", "PUT"]);
    }

    #[test]
    fn test_lowercase_and_duplicates_are_reported_once() {
        let source = "export const get = 1; export { get };";
        assert_eq!(scan_exports(source), vec!["get"]);
    }
}
