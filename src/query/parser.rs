// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Hand-rolled lexer and recursive-descent parser for the restricted SQL
//! dialect.

use crate::catalog::IndexDescriptor;
use crate::schema::{Column, ColumnType};
use crate::value::Value;
use crate::{Error, Result};

/// A parsed SQL statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// `CREATE TABLE t (col TYPE, ...)` - an empty sequential table
    CreateTable {
        /// Table name
        table: String,

        /// Declared columns
        columns: Vec<Column>,
    },

    /// `CREATE TABLE t FROM FILE "f.csv" USING INDEX idx(col)`
    CreateTableFromFile {
        /// Table name
        table: String,

        /// CSV file path
        path: String,

        /// Declared access method
        index: IndexDescriptor,
    },

    /// `SELECT * FROM t [WHERE ...]`
    Select {
        /// Table name
        table: String,

        /// Optional predicate
        predicate: Option<Predicate>,
    },

    /// `INSERT INTO t VALUES (...)`
    Insert {
        /// Table name
        table: String,

        /// Literal values in column order
        values: Vec<Value>,
    },

    /// `DELETE FROM t WHERE col = v`
    Delete {
        /// Table name
        table: String,

        /// Predicate column
        column: String,

        /// Predicate value
        value: Value,
    },
}

/// A `WHERE` clause.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `col = v`
    Eq {
        /// Predicate column
        column: String,

        /// Literal
        value: Value,
    },

    /// `col BETWEEN lo AND hi`
    Between {
        /// Predicate column
        column: String,

        /// Lower bound (inclusive)
        lo: Value,

        /// Upper bound (inclusive)
        hi: Value,
    },

    /// `KNN((x, y), k)`
    Knn {
        /// Query longitude
        x: f64,

        /// Query latitude
        y: f64,

        /// Neighbor count
        k: usize,
    },

    /// `WITHIN((x, y), radius_km)`
    Within {
        /// Query longitude
        x: f64,

        /// Query latitude
        y: f64,

        /// Radius in kilometers
        radius_km: f64,
    },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Star,
    Eq,
}

fn lex(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = vec![];
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(Error::Sql("unterminated string literal".into())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut s = String::new();
                s.push(c);
                chars.next();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(s));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(s));
            }
            c => return Err(Error::Sql(format!("unexpected character {c:?}"))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| Error::Sql("unexpected end of statement".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        let token = self.next()?;
        if token == *expected {
            Ok(())
        } else {
            Err(Error::Sql(format!("expected {expected:?}, got {token:?}")))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(s) => Ok(s),
            other => Err(Error::Sql(format!("expected identifier, got {other:?}"))),
        }
    }

    fn keyword(&mut self, kw: &str) -> Result<()> {
        let ident = self.ident()?;
        if ident.eq_ignore_ascii_case(kw) {
            Ok(())
        } else {
            Err(Error::Sql(format!("expected {kw}, got {ident}")))
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn value(&mut self) -> Result<Value> {
        match self.next()? {
            Token::Number(s) => Ok(Value::parse_literal(&s)),
            Token::Str(s) => Ok(Value::Str(s)),
            Token::Ident(s) => Ok(Value::Str(s)),
            other => Err(Error::Sql(format!("expected a value, got {other:?}"))),
        }
    }

    fn number(&mut self) -> Result<f64> {
        match self.next()? {
            Token::Number(s) => s
                .parse::<f64>()
                .map_err(|_| Error::Sql(format!("bad number {s:?}"))),
            other => Err(Error::Sql(format!("expected a number, got {other:?}"))),
        }
    }

    fn point(&mut self) -> Result<(f64, f64)> {
        self.expect(&Token::LParen)?;
        let x = self.number()?;
        self.expect(&Token::Comma)?;
        let y = self.number()?;
        self.expect(&Token::RParen)?;
        Ok((x, y))
    }

    fn column_type(&mut self) -> Result<ColumnType> {
        let name = self.ident()?;
        if name.eq_ignore_ascii_case("varchar") {
            self.expect(&Token::LBracket)?;
            let n = self.number()?;
            self.expect(&Token::RBracket)?;
            if n < 1.0 || n.fract() != 0.0 {
                return Err(Error::Sql(format!("bad VARCHAR width {n}")));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Ok(ColumnType::Varchar(n as usize));
        }
        ColumnType::parse(&name)
    }

    fn index_descriptor(&mut self) -> Result<IndexDescriptor> {
        let kind = self.ident()?;
        self.expect(&Token::LParen)?;

        let descriptor = match kind.to_lowercase().as_str() {
            "bplustree" => IndexDescriptor::Bplustree {
                column: self.ident()?,
            },
            "isam" => IndexDescriptor::Isam {
                column: self.ident()?,
            },
            "hash" => IndexDescriptor::Hash {
                column: self.ident()?,
            },
            "rtree" => {
                let x_column = self.ident()?;
                self.expect(&Token::Comma)?;
                let y_column = self.ident()?;
                IndexDescriptor::Rtree {
                    x_column,
                    y_column,
                    key_columns: vec![],
                }
            }
            other => return Err(Error::Sql(format!("unknown index type {other}"))),
        };

        self.expect(&Token::RParen)?;
        Ok(descriptor)
    }

    fn create(&mut self) -> Result<Statement> {
        self.keyword("TABLE")?;
        let table = self.ident()?;

        if self.peek_keyword("FROM") {
            self.keyword("FROM")?;
            self.keyword("FILE")?;
            let path = match self.next()? {
                Token::Str(s) => s,
                other => return Err(Error::Sql(format!("expected a file path, got {other:?}"))),
            };
            self.keyword("USING")?;
            self.keyword("INDEX")?;
            let index = self.index_descriptor()?;
            return Ok(Statement::CreateTableFromFile { table, path, index });
        }

        self.expect(&Token::LParen)?;
        let mut columns = vec![];
        loop {
            let name = self.ident()?;
            let ty = self.column_type()?;
            columns.push(Column::new(name, ty));
            match self.next()? {
                Token::Comma => {}
                Token::RParen => break,
                other => return Err(Error::Sql(format!("expected , or ), got {other:?}"))),
            }
        }

        Ok(Statement::CreateTable { table, columns })
    }

    fn predicate(&mut self) -> Result<Predicate> {
        if self.peek_keyword("KNN") {
            self.keyword("KNN")?;
            self.expect(&Token::LParen)?;
            let (x, y) = self.point()?;
            self.expect(&Token::Comma)?;
            let k = self.number()?;
            self.expect(&Token::RParen)?;
            if k < 1.0 || k.fract() != 0.0 {
                return Err(Error::Sql(format!("bad neighbor count {k}")));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            return Ok(Predicate::Knn { x, y, k: k as usize });
        }

        if self.peek_keyword("WITHIN") {
            self.keyword("WITHIN")?;
            self.expect(&Token::LParen)?;
            let (x, y) = self.point()?;
            self.expect(&Token::Comma)?;
            let radius_km = self.number()?;
            self.expect(&Token::RParen)?;
            return Ok(Predicate::Within { x, y, radius_km });
        }

        let column = self.ident()?;
        if self.peek_keyword("BETWEEN") {
            self.keyword("BETWEEN")?;
            let lo = self.value()?;
            self.keyword("AND")?;
            let hi = self.value()?;
            return Ok(Predicate::Between { column, lo, hi });
        }

        self.expect(&Token::Eq)?;
        let value = self.value()?;
        Ok(Predicate::Eq { column, value })
    }

    fn select(&mut self) -> Result<Statement> {
        self.expect(&Token::Star)?;
        self.keyword("FROM")?;
        let table = self.ident()?;

        let predicate = if self.peek_keyword("WHERE") {
            self.keyword("WHERE")?;
            Some(self.predicate()?)
        } else {
            None
        };

        Ok(Statement::Select { table, predicate })
    }

    fn insert(&mut self) -> Result<Statement> {
        self.keyword("INTO")?;
        let table = self.ident()?;
        self.keyword("VALUES")?;
        self.expect(&Token::LParen)?;

        let mut values = vec![];
        loop {
            values.push(self.value()?);
            match self.next()? {
                Token::Comma => {}
                Token::RParen => break,
                other => return Err(Error::Sql(format!("expected , or ), got {other:?}"))),
            }
        }

        Ok(Statement::Insert { table, values })
    }

    fn delete(&mut self) -> Result<Statement> {
        self.keyword("FROM")?;
        let table = self.ident()?;
        self.keyword("WHERE")?;
        let column = self.ident()?;
        self.expect(&Token::Eq)?;
        let value = self.value()?;

        Ok(Statement::Delete {
            table,
            column,
            value,
        })
    }

    fn statement(&mut self) -> Result<Statement> {
        let head = self.ident()?;
        let statement = match head.to_lowercase().as_str() {
            "create" => self.create()?,
            "select" => self.select()?,
            "insert" => self.insert()?,
            "delete" => self.delete()?,
            other => return Err(Error::Sql(format!("unknown statement {other}"))),
        };

        if let Some(extra) = self.peek() {
            return Err(Error::Sql(format!("trailing input at {extra:?}")));
        }

        Ok(statement)
    }
}

/// Parses one SQL statement.
pub fn parse(sql: &str) -> Result<Statement> {
    let mut parser = Parser {
        tokens: lex(sql)?,
        pos: 0,
    };
    parser.statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn parse_create_with_columns() -> crate::Result<()> {
        let statement = parse("CREATE TABLE Products (id VARCHAR[32], price FLOAT)")?;
        assert_eq!(
            Statement::CreateTable {
                table: "Products".into(),
                columns: vec![
                    Column::new("id", ColumnType::Varchar(32)),
                    Column::new("price", ColumnType::Float),
                ],
            },
            statement,
        );
        Ok(())
    }

    #[test]
    fn parse_create_from_file() -> crate::Result<()> {
        let statement =
            parse("CREATE TABLE cities FROM FILE \"/tmp/cities.csv\" USING INDEX rtree(lng, lat)")?;
        assert_eq!(
            Statement::CreateTableFromFile {
                table: "cities".into(),
                path: "/tmp/cities.csv".into(),
                index: IndexDescriptor::Rtree {
                    x_column: "lng".into(),
                    y_column: "lat".into(),
                    key_columns: vec![],
                },
            },
            statement,
        );
        Ok(())
    }

    #[test]
    fn parse_selects() -> crate::Result<()> {
        assert_eq!(
            Statement::Select {
                table: "t".into(),
                predicate: None,
            },
            parse("SELECT * FROM t")?,
        );

        assert_eq!(
            Statement::Select {
                table: "t".into(),
                predicate: Some(Predicate::Eq {
                    column: "price".into(),
                    value: Value::Float(9.5),
                }),
            },
            parse("select * from t where price = 9.5")?,
        );

        assert_eq!(
            Statement::Select {
                table: "t".into(),
                predicate: Some(Predicate::Between {
                    column: "price".into(),
                    lo: Value::Int(15),
                    hi: Value::Int(25),
                }),
            },
            parse("SELECT * FROM t WHERE price BETWEEN 15 AND 25")?,
        );

        Ok(())
    }

    #[test]
    fn parse_spatial_predicates() -> crate::Result<()> {
        assert_eq!(
            Statement::Select {
                table: "cities".into(),
                predicate: Some(Predicate::Knn {
                    x: 2.35,
                    y: 48.86,
                    k: 3,
                }),
            },
            parse("SELECT * FROM cities WHERE KNN((2.35, 48.86), 3)")?,
        );

        assert_eq!(
            Statement::Select {
                table: "cities".into(),
                predicate: Some(Predicate::Within {
                    x: -0.12,
                    y: 51.5,
                    radius_km: 500.0,
                }),
            },
            parse("SELECT * FROM cities WHERE WITHIN((-0.12, 51.5), 500)")?,
        );

        Ok(())
    }

    #[test]
    fn parse_insert_and_delete() -> crate::Result<()> {
        assert_eq!(
            Statement::Insert {
                table: "t".into(),
                values: vec![
                    Value::Str("a".into()),
                    Value::Int(3),
                    Value::Float(1.5),
                ],
            },
            parse("INSERT INTO t VALUES ('a', 3, 1.5)")?,
        );

        assert_eq!(
            Statement::Delete {
                table: "t".into(),
                column: "id".into(),
                value: Value::Str("a".into()),
            },
            parse("DELETE FROM t WHERE id = 'a'")?,
        );

        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(parse("DROP TABLE t").is_err());
        assert!(parse("SELECT * FROM").is_err());
        assert!(parse("INSERT INTO t VALUES ('a'").is_err());
        assert!(parse("SELECT * FROM t WHERE price ! 3").is_err());
        assert!(parse("CREATE TABLE t FROM FILE missing.csv USING INDEX isam(id)").is_err());
    }
}
