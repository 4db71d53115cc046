//! SELECT compiler - turns query text into a `QueryDescriptor`
//!
//! The query is held in an owned working buffer. Each extractor pass lexes
//! the current buffer, reads its clause and cuts that clause out before the
//! next pass runs. Pass order is fixed:
//!
//! 1. APPROXIMATE_COUNT(...) -> COUNT(...)
//! 2. SELECT DISTINCT
//! 3. LIMIT
//! 4. ORDER BY (must go before GROUP BY, whose list runs to end of text)
//! 5. GROUP BY
//! 6. WHERE split
//! 7. JOIN
//! 8. SELECT <fields> FROM <table>
//! 9. WHERE conditions, then the field list and COUNT(DISTINCT ...) scan

use super::ast::*;
use super::evaluator::strip_quotes;
use super::lexer::tokenize;
use super::token::{Token, TokenType};
use crate::error::{QueryError, Result};
use tracing::{debug, warn};

/// Compile one SELECT statement
pub fn parse_select_query(sql: &str) -> Result<QueryDescriptor> {
    Parser::new(sql).parse()
}

pub struct Parser {
    query: String,
}

impl Parser {
    pub fn new(sql: &str) -> Self {
        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
        Self { query: trimmed.to_string() }
    }

    pub fn parse(mut self) -> Result<QueryDescriptor> {
        if self.query.is_empty() {
            return Err(QueryError::Parse("Empty query".to_string()));
        }

        let (is_approximate_count, approximate_distinct) = self.rewrite_approximate_count()?;
        let is_distinct = self.strip_select_distinct()?;
        let limit = self.extract_limit()?;
        let order_by_fields = self.extract_order_by()?;
        let group_by_fields = self.extract_group_by()?;
        let where_text = self.split_where()?;
        let join = self.extract_join()?;
        let (fields_text, table) = self.parse_select_from()?;

        let where_clauses = match where_text {
            Some(text) => parse_where_clause(&text)?,
            None => Vec::new(),
        };

        let fields = split_field_list(&fields_text)?;
        let has_aggregate_without_group_by = group_by_fields.is_none()
            && fields.iter().any(|f| AggregateExpr::parse(f).is_some());
        let (count_distinct, distinct_fields) = detect_count_distinct(&fields)?;

        let descriptor = QueryDescriptor {
            fields,
            table,
            where_clauses,
            join,
            group_by_fields,
            order_by_fields,
            limit,
            is_distinct,
            is_approximate_count,
            is_count_distinct: count_distinct || approximate_distinct,
            distinct_fields,
            has_aggregate_without_group_by,
        };

        debug!(
            table = %descriptor.table,
            fields = descriptor.fields.len(),
            conditions = descriptor.where_clauses.len(),
            join = descriptor.join.is_some(),
            "compiled SELECT"
        );
        Ok(descriptor)
    }

    fn tokens(&self) -> Result<Vec<Token>> {
        tokenize(&self.query)
    }

    /// Cut the buffer at `pos`, dropping trailing whitespace
    fn truncate_at(&mut self, pos: usize) {
        self.query.truncate(pos);
        let len = self.query.trim_end().len();
        self.query.truncate(len);
    }

    /// Pass 1: APPROXIMATE_COUNT(x) becomes COUNT(x). Returns
    /// (approximate, distinct-inside-approximate).
    fn rewrite_approximate_count(&mut self) -> Result<(bool, bool)> {
        let mut found = false;
        let mut distinct = false;

        loop {
            let tokens = self.tokens()?;
            let hit = tokens.windows(2).position(|w| {
                matches!(&w[0].token_type, TokenType::Identifier(name) if name.eq_ignore_ascii_case("APPROXIMATE_COUNT"))
                    && w[1].is(&TokenType::LParen)
            });
            let Some(i) = hit else { break };

            found = true;
            if tokens.get(i + 2).map_or(false, |t| t.is(&TokenType::Distinct)) {
                distinct = true;
            }
            self.query.replace_range(tokens[i].start..tokens[i].end, "COUNT");
        }

        Ok((found, distinct))
    }

    /// Pass 2: `SELECT DISTINCT`
    fn strip_select_distinct(&mut self) -> Result<bool> {
        let tokens = self.tokens()?;
        if tokens.len() > 2 && tokens[0].is(&TokenType::Select) && tokens[1].is(&TokenType::Distinct) {
            self.query.replace_range(tokens[1].start..tokens[2].start, "");
            return Ok(true);
        }
        Ok(false)
    }

    /// Pass 3: trailing `LIMIT n`
    fn extract_limit(&mut self) -> Result<Option<usize>> {
        let tokens = self.tokens()?;
        let Some(i) = find_top_level(&tokens, 0, |t| t.is(&TokenType::Limit)) else {
            return Ok(None);
        };

        let limit = match tokens.get(i + 1).map(|t| &t.token_type) {
            Some(TokenType::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => *n as usize,
            _ => return Err(QueryError::Parse("LIMIT expects a non-negative integer".to_string())),
        };
        if !tokens[i + 2].is(&TokenType::Eof) {
            return Err(QueryError::Parse("LIMIT must be the last clause".to_string()));
        }

        self.truncate_at(tokens[i].start);
        Ok(Some(limit))
    }

    /// Pass 4: trailing `ORDER BY f [ASC|DESC], ...`
    fn extract_order_by(&mut self) -> Result<Option<Vec<OrderByField>>> {
        let tokens = self.tokens()?;
        let Some(i) = find_keyword_pair(&tokens, &TokenType::Order, &TokenType::By) else {
            return Ok(None);
        };

        let body = &tokens[i + 2..tokens.len() - 1];
        let mut fields = Vec::new();
        for (_, item) in split_top_level(body, |t| t.is(&TokenType::Comma)) {
            let (field_tokens, order) = match item.last().map(|t| &t.token_type) {
                Some(TokenType::Desc) => (&item[..item.len() - 1], SortOrder::Desc),
                Some(TokenType::Asc) => (&item[..item.len() - 1], SortOrder::Asc),
                _ => (item, SortOrder::Asc),
            };
            let field = span_text(&self.query, field_tokens);
            if field.is_empty() {
                return Err(QueryError::Parse("Invalid ORDER BY clause".to_string()));
            }
            fields.push(OrderByField { field: field.to_string(), order });
        }

        self.truncate_at(tokens[i].start);
        Ok(Some(fields))
    }

    /// Pass 5: trailing `GROUP BY f, ...`
    fn extract_group_by(&mut self) -> Result<Option<Vec<String>>> {
        let tokens = self.tokens()?;
        let Some(i) = find_keyword_pair(&tokens, &TokenType::Group, &TokenType::By) else {
            return Ok(None);
        };

        let body = &tokens[i + 2..tokens.len() - 1];
        let mut fields = Vec::new();
        for (_, item) in split_top_level(body, |t| t.is(&TokenType::Comma)) {
            let field = span_text(&self.query, item);
            if field.is_empty() {
                return Err(QueryError::Parse("Invalid GROUP BY clause".to_string()));
            }
            fields.push(field.to_string());
        }

        self.truncate_at(tokens[i].start);
        Ok(Some(fields))
    }

    /// Pass 6: split at the first WHERE; the buffer keeps the pre-WHERE part
    fn split_where(&mut self) -> Result<Option<String>> {
        let tokens = self.tokens()?;
        let Some(i) = find_top_level(&tokens, 0, |t| t.is(&TokenType::Where)) else {
            return Ok(None);
        };

        let where_text = self.query[tokens[i].end..].trim().to_string();
        if where_text.is_empty() {
            return Err(QueryError::Parse("WHERE clause is empty".to_string()));
        }

        self.truncate_at(tokens[i].start);
        Ok(Some(where_text))
    }

    /// Pass 7: `(INNER|LEFT|RIGHT) JOIN table ON a = b`
    fn extract_join(&mut self) -> Result<Option<JoinSpec>> {
        let tokens = self.tokens()?;
        let Some(j) = find_top_level(&tokens, 0, |t| t.is(&TokenType::Join)) else {
            return Ok(None);
        };

        // Optional OUTER between the join type and JOIN
        let outer = j >= 2 && tokens[j - 1].is(&TokenType::Outer);
        let type_idx = if outer { j - 2 } else { j.saturating_sub(1) };
        let join_type = match &tokens[type_idx].token_type {
            TokenType::Inner if !outer => JoinType::Inner,
            TokenType::Left => JoinType::Left,
            TokenType::Right => JoinType::Right,
            TokenType::Full => return Err(QueryError::UnsupportedOperation("Unsupported JOIN type: FULL".to_string())),
            TokenType::Cross => return Err(QueryError::UnsupportedOperation("Unsupported JOIN type: CROSS".to_string())),
            _ => return Err(QueryError::Parse("JOIN requires INNER, LEFT or RIGHT".to_string())),
        };

        let Some(on) = find_top_level(&tokens, j + 1, |t| t.is(&TokenType::On)) else {
            return Err(QueryError::Parse("JOIN requires an ON condition".to_string()));
        };
        let table = span_text(&self.query, &tokens[j + 1..on]).to_string();
        if table.is_empty() {
            return Err(QueryError::Parse("JOIN requires a table name".to_string()));
        }

        let condition = &tokens[on + 1..tokens.len() - 1];
        let Some(eq) = condition.iter().position(|t| t.is(&TokenType::Eq)) else {
            return Err(QueryError::Parse("Invalid JOIN condition".to_string()));
        };
        let left = span_text(&self.query, &condition[..eq]).to_string();
        let right = span_text(&self.query, &condition[eq + 1..]).to_string();
        if !is_field_reference(&left) || !is_field_reference(&right) {
            return Err(QueryError::Parse("Invalid JOIN condition".to_string()));
        }

        self.truncate_at(tokens[type_idx].start);
        Ok(Some(JoinSpec { join_type, table, left, right }))
    }

    /// Pass 8: `SELECT <fields> FROM <table>` over what is left
    fn parse_select_from(&self) -> Result<(String, String)> {
        let tokens = self.tokens()?;
        if !tokens[0].is(&TokenType::Select) {
            return Err(QueryError::Parse("Invalid SELECT format".to_string()));
        }
        let Some(from) = find_top_level(&tokens, 1, |t| t.is(&TokenType::From)) else {
            return Err(QueryError::Parse("Invalid SELECT format".to_string()));
        };

        let fields = self.query[tokens[0].end..tokens[from].start].trim();
        let table = self.query[tokens[from].end..].trim();
        if fields.is_empty() || table.is_empty() {
            return Err(QueryError::Parse("Invalid SELECT format".to_string()));
        }
        if table.chars().any(char::is_whitespace) {
            return Err(QueryError::Parse(format!("Invalid table name: {}", table)));
        }

        Ok((fields.to_string(), table.to_string()))
    }
}

/// Parse WHERE text into a flat condition list.
///
/// AND and OR are both split points and both mean AND: there is no
/// operator precedence in this grammar.
pub fn parse_where_clause(text: &str) -> Result<Vec<Condition>> {
    let tokens = tokenize(text)?;
    let body = &tokens[..tokens.len() - 1];

    let mut conditions = Vec::new();
    for (separator, segment) in split_top_level(body, |t| t.is(&TokenType::And) || t.is(&TokenType::Or)) {
        let connective = separator.map(|t| {
            if t.is(&TokenType::Or) {
                Connective::Or
            } else {
                Connective::And
            }
        });
        if connective == Some(Connective::Or) {
            warn!(clause = text, "OR in WHERE is evaluated as AND");
        }
        conditions.push(parse_condition(text, segment, connective)?);
    }
    Ok(conditions)
}

fn parse_condition(text: &str, segment: &[Token], connective: Option<Connective>) -> Result<Condition> {
    let invalid = || QueryError::Parse("Invalid WHERE clause format".to_string());

    if let Some(like) = segment.iter().position(|t| t.is(&TokenType::Like)) {
        let field = span_text(text, &segment[..like]);
        let pattern = span_text(text, &segment[like + 1..]);
        if field.is_empty() || pattern.is_empty() {
            return Err(invalid());
        }
        return Ok(Condition {
            field: field.to_string(),
            operator: CompareOp::Like,
            value: strip_quotes(pattern).to_string(),
            connective,
        });
    }

    let (op_idx, operator) = segment
        .iter()
        .enumerate()
        .find_map(|(i, t)| compare_op(t).map(|op| (i, op)))
        .ok_or_else(invalid)?;

    if let Some(next) = segment.get(op_idx + 1) {
        if next.is_comparison() {
            return Err(QueryError::UnsupportedOperation(format!(
                "Unsupported operator: {}",
                &text[segment[op_idx].start..next.end]
            )));
        }
    }

    let field = span_text(text, &segment[..op_idx]);
    let value = span_text(text, &segment[op_idx + 1..]);
    if field.is_empty() || value.is_empty() {
        return Err(invalid());
    }

    Ok(Condition {
        field: field.to_string(),
        operator,
        value: value.to_string(),
        connective,
    })
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token.token_type {
        TokenType::Eq => Some(CompareOp::Eq),
        TokenType::Ne => Some(CompareOp::Ne),
        TokenType::Gt => Some(CompareOp::Gt),
        TokenType::Lt => Some(CompareOp::Lt),
        TokenType::Ge => Some(CompareOp::Ge),
        TokenType::Le => Some(CompareOp::Le),
        _ => None,
    }
}

/// Split a SELECT list on commas outside parentheses
pub fn split_field_list(text: &str) -> Result<Vec<String>> {
    let tokens = tokenize(text)?;
    let body = &tokens[..tokens.len() - 1];

    split_top_level(body, |t| t.is(&TokenType::Comma))
        .into_iter()
        .map(|(_, item)| {
            let field = span_text(text, item);
            if field.is_empty() {
                Err(QueryError::Parse("Empty field in SELECT list".to_string()))
            } else {
                Ok(field.to_string())
            }
        })
        .collect()
}

/// Find `COUNT(DISTINCT (a, b))` / `COUNT(DISTINCT a)` fields and collect
/// the distinct key fields
fn detect_count_distinct(fields: &[String]) -> Result<(bool, Vec<String>)> {
    let mut found = false;
    let mut distinct_fields = Vec::new();

    for field in fields {
        let tokens = tokenize(field)?;
        let is_count = matches!(&tokens[0].token_type, TokenType::Identifier(name) if name.eq_ignore_ascii_case("COUNT"));
        if !is_count
            || !tokens.get(1).map_or(false, |t| t.is(&TokenType::LParen))
            || !tokens.get(2).map_or(false, |t| t.is(&TokenType::Distinct))
        {
            continue;
        }

        let close = matching_paren(&tokens, 1).ok_or_else(|| {
            QueryError::Parse(format!("Unbalanced parentheses in {}", field))
        })?;
        let mut inner = &tokens[3..close];
        if tokens[3].is(&TokenType::LParen) && matching_paren(&tokens, 3) == Some(close - 1) {
            inner = &tokens[4..close - 1];
        }

        for (_, item) in split_top_level(inner, |t| t.is(&TokenType::Comma)) {
            let name = span_text(field, item);
            if name.is_empty() {
                return Err(QueryError::Parse(format!("Invalid COUNT(DISTINCT ...) in {}", field)));
            }
            distinct_fields.push(name.to_string());
        }
        found = true;
    }

    Ok((found, distinct_fields))
}

/// `name` or `table.name`
fn is_field_reference(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with('.')
        && !text.ends_with('.')
        && text.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Source text covered by a token run (empty for an empty run)
fn span_text<'a>(text: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => &text[first.start..last.end],
        _ => "",
    }
}

/// First token at or after `from`, outside parentheses, satisfying `pred`
fn find_top_level<F>(tokens: &[Token], from: usize, pred: F) -> Option<usize>
where
    F: Fn(&Token) -> bool,
{
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate() {
        match token.token_type {
            TokenType::LParen => depth += 1,
            TokenType::RParen => depth -= 1,
            _ => {}
        }
        if i >= from && depth == 0 && pred(token) {
            return Some(i);
        }
    }
    None
}

fn find_keyword_pair(tokens: &[Token], first: &TokenType, second: &TokenType) -> Option<usize> {
    let mut from = 0;
    while let Some(i) = find_top_level(tokens, from, |t| t.is(first)) {
        if tokens.get(i + 1).map_or(false, |t| t.is(second)) {
            return Some(i);
        }
        from = i + 1;
    }
    None
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.token_type {
            TokenType::LParen => depth += 1,
            TokenType::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on top-level separator tokens. Each segment is paired with the
/// separator that preceded it; there is always at least one segment.
fn split_top_level<'a, F>(tokens: &'a [Token], is_separator: F) -> Vec<(Option<&'a Token>, &'a [Token])>
where
    F: Fn(&Token) -> bool,
{
    let mut segments = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut separator = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.token_type {
            TokenType::LParen => depth += 1,
            TokenType::RParen => depth -= 1,
            _ => {}
        }
        if depth == 0 && is_separator(token) {
            segments.push((separator, &tokens[start..i]));
            separator = Some(token);
            start = i + 1;
        }
    }
    segments.push((separator, &tokens[start..]));
    segments
}
