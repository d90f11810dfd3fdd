//! Hand-written template expander
//!
//! Recognises exactly the constructs of the model dialect and nothing else.
//! `ref()` and `source()` are rewritten to opaque placeholder tokens that
//! survive SQL parsing as ordinary identifiers; they are resolved to physical
//! identifiers immediately before execution, once the target environment is
//! known. Expansion is pure: no I/O, no registry access.
//!
//! `{% if %}` branches are both expanded for ref/source collection (so a
//! model's dependency set does not flip between first and incremental runs),
//! but only the taken branch is emitted.

use crate::error::{TemplateError, TemplateResult};
use crate::header::{extract_header, is_directive_line};
use std::collections::{BTreeMap, BTreeSet};

/// Placeholder prefix for `ref()` targets: `__REF__<model>__`
pub const REF_PREFIX: &str = "__REF__";

/// Placeholder prefix for `source()` targets: `__SRC__<group>__<table>__`
pub const SRC_PREFIX: &str = "__SRC__";

/// Placeholder emitted for `{{ this }}` when the physical identifier is not
/// yet known (compile-time expansion).
pub const THIS_TOKEN: &str = "__THIS__";

/// Context for a single expansion
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandContext<'a> {
    /// Physical identifier of the model being expanded. `None` emits the
    /// `__THIS__` placeholder instead (resolved later).
    pub this: Option<&'a str>,

    /// Whether the model has been previously materialised
    pub is_incremental: bool,
}

/// Output of expanding one model's SQL
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Expanded SQL with placeholder tokens, header directives stripped
    pub sql: String,

    /// Model names referenced via `ref()`
    pub refs: BTreeSet<String>,

    /// (group, table) pairs referenced via `source()`
    pub sources: BTreeSet<(String, String)>,

    /// Config map from the `-- config:` header
    pub config: BTreeMap<String, String>,

    /// Explicit extra dependencies from the `-- depends_on:` header
    pub depends_on: Vec<String>,
}

/// Expand raw model SQL against a context.
pub fn expand(raw: &str, ctx: &ExpandContext<'_>) -> TemplateResult<Expansion> {
    let header = extract_header(raw);
    let body = strip_directives(raw);

    let mut expander = Expander {
        chars: body.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        ctx: *ctx,
        refs: BTreeSet::new(),
        sources: BTreeSet::new(),
    };

    let (sql, terminator) = expander.parse_region()?;
    match terminator {
        Terminator::Eof => {}
        Terminator::Else { line, column } => {
            return Err(TemplateError::DanglingTag {
                tag: "else".to_string(),
                line,
                column,
            })
        }
        Terminator::Endif { line, column } => {
            return Err(TemplateError::DanglingTag {
                tag: "endif".to_string(),
                line,
                column,
            })
        }
    }

    Ok(Expansion {
        sql,
        refs: expander.refs,
        sources: expander.sources,
        config: header.config,
        depends_on: header.depends_on,
    })
}

/// Drop header directive lines from the leading comment block.
fn strip_directives(raw: &str) -> String {
    let mut out = Vec::new();
    let mut in_leading_block = true;

    for line in raw.lines() {
        let trimmed = line.trim();
        if in_leading_block {
            if trimmed.is_empty() || trimmed.starts_with("--") {
                if is_directive_line(line) {
                    continue;
                }
            } else {
                in_leading_block = false;
            }
        }
        out.push(line);
    }

    out.join("\n")
}

/// How a parsed region ended
enum Terminator {
    Eof,
    Else { line: usize, column: usize },
    Endif { line: usize, column: usize },
}

struct Expander<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    ctx: ExpandContext<'a>,
    refs: BTreeSet<String>,
    sources: BTreeSet<(String, String)>,
}

impl Expander<'_> {
    fn peek2(&self) -> Option<(char, char)> {
        match (self.chars.get(self.pos), self.chars.get(self.pos + 1)) {
            (Some(&a), Some(&b)) => Some((a, b)),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = *self.chars.get(self.pos)?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Parse until EOF or an `{% else %}` / `{% endif %}` tag.
    fn parse_region(&mut self) -> TemplateResult<(String, Terminator)> {
        let mut out = String::new();

        loop {
            match self.peek2() {
                None => {
                    // Trailing single char, if any
                    while let Some(c) = self.advance() {
                        out.push(c);
                    }
                    return Ok((out, Terminator::Eof));
                }
                Some(('{', '{')) => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    let inner = self.read_until("}}", "{{", line, column)?;
                    out.push_str(&self.expand_expression(inner.trim(), line, column)?);
                }
                Some(('{', '%')) => {
                    let (line, column) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    let inner = self.read_until("%}", "{%", line, column)?;
                    let tag = inner.trim();

                    if let Some(cond) = tag.strip_prefix("if ") {
                        out.push_str(&self.expand_if(cond.trim(), line, column)?);
                    } else if tag == "else" {
                        return Ok((out, Terminator::Else { line, column }));
                    } else if tag == "endif" {
                        return Ok((out, Terminator::Endif { line, column }));
                    } else {
                        return Err(TemplateError::UnknownTag {
                            tag: tag.to_string(),
                            line,
                            column,
                        });
                    }
                }
                Some(_) => {
                    // Safety: peek2 returned Some, so advance succeeds
                    if let Some(c) = self.advance() {
                        out.push(c);
                    }
                }
            }
        }
    }

    /// Consume characters until the closing delimiter, returning the inner text.
    fn read_until(
        &mut self,
        close: &str,
        open: &'static str,
        line: usize,
        column: usize,
    ) -> TemplateResult<String> {
        let close_chars: Vec<char> = close.chars().collect();
        let mut inner = String::new();

        loop {
            if self.chars.get(self.pos) == Some(&close_chars[0])
                && self.chars.get(self.pos + 1) == Some(&close_chars[1])
            {
                self.advance();
                self.advance();
                return Ok(inner);
            }
            match self.advance() {
                Some(c) => inner.push(c),
                None => {
                    return Err(TemplateError::UnclosedDelimiter { open, line, column });
                }
            }
        }
    }

    /// Expand a `{{ ... }}` expression into its replacement text.
    fn expand_expression(
        &mut self,
        expr: &str,
        line: usize,
        column: usize,
    ) -> TemplateResult<String> {
        let ident: String = expr
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();

        match ident.as_str() {
            "this" if expr == "this" => Ok(self.ctx.this.unwrap_or(THIS_TOKEN).to_string()),
            "is_incremental" if expr == "is_incremental()" => Ok(if self.ctx.is_incremental {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }),
            "ref" => {
                let args = parse_call_args(expr, "ref", line, column)?;
                if args.len() != 1 {
                    return Err(TemplateError::MalformedArguments {
                        expr: expr.to_string(),
                        line,
                        column,
                    });
                }
                let name = args.into_iter().next().unwrap_or_default();
                self.refs.insert(name.clone());
                Ok(format!("{}{}__", REF_PREFIX, name))
            }
            "source" => {
                let args = parse_call_args(expr, "source", line, column)?;
                if args.len() != 2 {
                    return Err(TemplateError::MalformedArguments {
                        expr: expr.to_string(),
                        line,
                        column,
                    });
                }
                let mut it = args.into_iter();
                let group = it.next().unwrap_or_default();
                let table = it.next().unwrap_or_default();
                self.sources.insert((group.clone(), table.clone()));
                Ok(format!("{}{}__{}__", SRC_PREFIX, group, table))
            }
            _ => Err(TemplateError::UnknownExpression {
                expr: expr.to_string(),
                line,
                column,
            }),
        }
    }

    /// Expand an if block. Both branches are walked (collecting refs and
    /// sources); only the taken branch contributes output.
    fn expand_if(&mut self, cond: &str, line: usize, column: usize) -> TemplateResult<String> {
        let value = match cond {
            "is_incremental()" => self.ctx.is_incremental,
            "true" | "True" | "TRUE" => true,
            "false" | "False" | "FALSE" => false,
            other => {
                return Err(TemplateError::UnsupportedCondition {
                    expr: other.to_string(),
                    line,
                    column,
                })
            }
        };

        let (then_out, term) = self.parse_region()?;
        let else_out = match term {
            Terminator::Endif { .. } => String::new(),
            Terminator::Else { .. } => {
                let (else_out, term2) = self.parse_region()?;
                match term2 {
                    Terminator::Endif { .. } => else_out,
                    _ => return Err(TemplateError::UnterminatedIf { line, column }),
                }
            }
            Terminator::Eof => return Err(TemplateError::UnterminatedIf { line, column }),
        };

        Ok(if value { then_out } else { else_out })
    }
}

/// Parse `name('a', "b", ...)` style arguments into the string values.
fn parse_call_args(
    expr: &str,
    name: &str,
    line: usize,
    column: usize,
) -> TemplateResult<Vec<String>> {
    let malformed = || TemplateError::MalformedArguments {
        expr: expr.to_string(),
        line,
        column,
    };

    let rest = expr.strip_prefix(name).ok_or_else(malformed)?;
    let rest = rest.trim();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(malformed)?;

    let mut args = Vec::new();
    for piece in inner.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            return Err(malformed());
        }
        let unquoted = piece
            .strip_prefix('\'')
            .and_then(|p| p.strip_suffix('\''))
            .or_else(|| piece.strip_prefix('"').and_then(|p| p.strip_suffix('"')))
            .ok_or_else(malformed)?;
        if unquoted.is_empty() {
            return Err(malformed());
        }
        args.push(unquoted.to_string());
    }
    Ok(args)
}

#[cfg(test)]
#[path = "expander_test.rs"]
mod tests;
