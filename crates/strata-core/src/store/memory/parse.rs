use crate::executor::StoreError;
use std::str::FromStr;
use strata_schema::types::FieldType;

///
/// Token
///

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Text(String),
    Placeholder,
    Symbol(&'static str),
}

fn tokenize(input: &str) -> Result<Vec<Token>, StoreError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '"' => {
                let start = i + 1;
                let end = (start..chars.len())
                    .find(|&j| chars[j] == '"')
                    .ok_or_else(|| invalid("unterminated quoted identifier"))?;
                tokens.push(Token::Quoted(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '\'' => {
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            text.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                        None => return Err(invalid("unterminated string literal")),
                    }
                }
                tokens.push(Token::Text(text));
            }
            '?' => {
                tokens.push(Token::Placeholder);
                i += 1;
            }
            '<' | '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Symbol(if c == '<' { "<=" } else { ">=" }));
                i += 2;
            }
            '(' | ')' | ',' | ';' | '=' | '<' | '>' | '*' | '.' | '{' | '}' | ':' => {
                tokens.push(Token::Symbol(symbol(c)));
                i += 1;
            }
            c if is_word_start(c, chars.get(i + 1).copied()) => {
                let start = i;
                i += 1;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Word(chars[start..i].iter().collect()));
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

const fn symbol(c: char) -> &'static str {
    match c {
        '(' => "(",
        ')' => ")",
        ',' => ",",
        ';' => ";",
        '=' => "=",
        '<' => "<",
        '>' => ">",
        '*' => "*",
        '.' => ".",
        '{' => "{",
        '}' => "}",
        _ => ":",
    }
}

fn is_word_start(c: char, next: Option<char>) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || (c == '-' && next.is_some_and(|n| n.is_ascii_digit()))
}

// words cover identifiers, numbers, uuids and hex blobs
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidQuery(message.into())
}

///
/// TableRef
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TableRef {
    pub keyspace: Option<String>,
    pub name: String,
}

///
/// Term
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Term {
    Placeholder(usize),
    Literal { raw: String, quoted: bool },
}

///
/// Op
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

///
/// Operand / Rhs / Condition
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Operand {
    Column(String),
    Token(Vec<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Rhs {
    Term(Term),
    Token(Vec<Term>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Condition {
    pub lhs: Operand,
    pub op: Op,
    pub rhs: Rhs,
}

///
/// Projection
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Projection {
    All,
    Count,
    Columns(Vec<String>),
}

///
/// Command
///
/// Parsed form of the statement subset the engine emits.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Command {
    AlterKeyspace,
    AlterTableAdd {
        table: TableRef,
        column: (String, FieldType),
    },
    AlterTableOptions {
        table: TableRef,
    },
    CreateKeyspace {
        name: String,
        if_not_exists: bool,
    },
    CreateTable {
        table: TableRef,
        if_not_exists: bool,
        columns: Vec<(String, FieldType)>,
        partition_key: Vec<String>,
        clustering_key: Vec<String>,
    },
    Delete {
        table: TableRef,
        timestamp: Option<Term>,
        conditions: Vec<Condition>,
    },
    DropKeyspace {
        name: String,
        if_exists: bool,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
    },
    Insert {
        table: TableRef,
        columns: Vec<String>,
        values: Vec<Term>,
        ttl: Option<Term>,
        timestamp: Option<Term>,
    },
    Select {
        table: TableRef,
        projection: Projection,
        conditions: Vec<Condition>,
        descending: Option<bool>,
        limit: Option<Term>,
    },
    Truncate {
        table: TableRef,
    },
}

impl Command {
    #[must_use]
    pub(crate) const fn is_write(&self) -> bool {
        matches!(self, Self::Insert { .. } | Self::Delete { .. })
    }
}

/// Parse one statement, returning the command and its placeholder count.
pub(crate) fn parse(query: &str) -> Result<(Command, usize), StoreError> {
    let mut parser = Parser {
        tokens: tokenize(query)?,
        pos: 0,
        placeholders: 0,
    };

    let command = parser.command()?;
    parser.eat_symbol(";");
    if let Some(token) = parser.peek() {
        return Err(invalid(format!("unexpected trailing token {token:?}")));
    }

    Ok((command, parser.placeholders))
}

///
/// Parser
///

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    placeholders: usize,
}

impl Parser {
    fn command(&mut self) -> Result<Command, StoreError> {
        let head = self.word()?;

        match head.to_ascii_uppercase().as_str() {
            "CREATE" => self.create(),
            "ALTER" => self.alter(),
            "DROP" => self.drop(),
            "TRUNCATE" => Ok(Command::Truncate {
                table: self.table_ref()?,
            }),
            "INSERT" => self.insert(),
            "SELECT" => self.select(),
            "DELETE" => self.delete(),
            other => Err(invalid(format!("unsupported statement {other}"))),
        }
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    fn create(&mut self) -> Result<Command, StoreError> {
        if self.eat_keyword("KEYSPACE") {
            let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
            let name = self.name()?;
            self.skip_rest();

            return Ok(Command::CreateKeyspace {
                name,
                if_not_exists,
            });
        }

        self.expect_keyword("TABLE")?;
        let if_not_exists = self.eat_keywords(&["IF", "NOT", "EXISTS"]);
        let table = self.table_ref()?;
        self.expect_symbol("(")?;

        let mut columns = Vec::new();
        let mut partition_key = Vec::new();
        let mut clustering_key = Vec::new();

        loop {
            if self.eat_keywords(&["PRIMARY", "KEY"]) {
                self.expect_symbol("(")?;
                if self.eat_symbol("(") {
                    partition_key = self.name_list()?;
                } else {
                    partition_key = vec![self.name()?];
                }
                while self.eat_symbol(",") {
                    clustering_key.push(self.name()?);
                }
                self.expect_symbol(")")?;
            } else {
                let name = self.name()?;
                let field_type = self.field_type()?;
                if self.eat_keywords(&["PRIMARY", "KEY"]) {
                    partition_key = vec![name.clone()];
                }
                columns.push((name, field_type));
            }

            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(")")?;
        self.skip_rest();

        if partition_key.is_empty() {
            return Err(invalid("table has no primary key"));
        }

        Ok(Command::CreateTable {
            table,
            if_not_exists,
            columns,
            partition_key,
            clustering_key,
        })
    }

    fn alter(&mut self) -> Result<Command, StoreError> {
        if self.eat_keyword("KEYSPACE") {
            self.skip_rest();
            return Ok(Command::AlterKeyspace);
        }

        self.expect_keyword("TABLE")?;
        let table = self.table_ref()?;

        if self.eat_keyword("ADD") {
            let name = self.name()?;
            let field_type = self.field_type()?;
            return Ok(Command::AlterTableAdd {
                table,
                column: (name, field_type),
            });
        }

        self.expect_keyword("WITH")?;
        self.skip_rest();

        Ok(Command::AlterTableOptions { table })
    }

    fn drop(&mut self) -> Result<Command, StoreError> {
        if self.eat_keyword("KEYSPACE") {
            let if_exists = self.eat_keywords(&["IF", "EXISTS"]);
            return Ok(Command::DropKeyspace {
                name: self.name()?,
                if_exists,
            });
        }

        self.expect_keyword("TABLE")?;
        let if_exists = self.eat_keywords(&["IF", "EXISTS"]);

        Ok(Command::DropTable {
            table: self.table_ref()?,
            if_exists,
        })
    }

    // ------------------------------------------------------------------
    // DML
    // ------------------------------------------------------------------

    fn insert(&mut self) -> Result<Command, StoreError> {
        self.expect_keyword("INTO")?;
        let table = self.table_ref()?;
        self.expect_symbol("(")?;
        let columns = self.name_list()?;
        self.expect_keyword("VALUES")?;
        self.expect_symbol("(")?;

        let mut values = vec![self.term()?];
        while self.eat_symbol(",") {
            values.push(self.term()?);
        }
        self.expect_symbol(")")?;

        if values.len() != columns.len() {
            return Err(invalid("column and value counts differ"));
        }

        let (ttl, timestamp) = self.using()?;

        Ok(Command::Insert {
            table,
            columns,
            values,
            ttl,
            timestamp,
        })
    }

    fn select(&mut self) -> Result<Command, StoreError> {
        let projection = if self.eat_symbol("*") {
            Projection::All
        } else if self.peek_keyword("COUNT") {
            self.pos += 1;
            self.expect_symbol("(")?;
            self.expect_symbol("*")?;
            self.expect_symbol(")")?;
            Projection::Count
        } else {
            let mut columns = vec![self.name()?];
            while self.eat_symbol(",") {
                columns.push(self.name()?);
            }
            Projection::Columns(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.table_ref()?;

        let conditions = if self.eat_keyword("WHERE") {
            self.conditions()?
        } else {
            Vec::new()
        };

        let mut descending = None;
        if self.eat_keywords(&["ORDER", "BY"]) {
            self.name()?;
            descending = Some(if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            });
        }

        let limit = if self.eat_keyword("LIMIT") {
            Some(self.term()?)
        } else {
            None
        };
        self.eat_keywords(&["ALLOW", "FILTERING"]);

        Ok(Command::Select {
            table,
            projection,
            conditions,
            descending,
            limit,
        })
    }

    fn delete(&mut self) -> Result<Command, StoreError> {
        self.expect_keyword("FROM")?;
        let table = self.table_ref()?;
        let (_, timestamp) = self.using()?;
        self.expect_keyword("WHERE")?;

        Ok(Command::Delete {
            table,
            timestamp,
            conditions: self.conditions()?,
        })
    }

    // USING TTL n | USING TIMESTAMP n [AND TTL n]
    fn using(&mut self) -> Result<(Option<Term>, Option<Term>), StoreError> {
        let mut ttl = None;
        let mut timestamp = None;

        if self.eat_keyword("USING") {
            loop {
                if self.eat_keyword("TTL") {
                    ttl = Some(self.term()?);
                } else {
                    self.expect_keyword("TIMESTAMP")?;
                    timestamp = Some(self.term()?);
                }
                if !self.eat_keyword("AND") {
                    break;
                }
            }
        }

        Ok((ttl, timestamp))
    }

    fn conditions(&mut self) -> Result<Vec<Condition>, StoreError> {
        let mut conditions = vec![self.condition()?];
        while self.eat_keyword("AND") {
            conditions.push(self.condition()?);
        }

        Ok(conditions)
    }

    fn condition(&mut self) -> Result<Condition, StoreError> {
        let lhs = if self.peek_keyword("TOKEN") {
            self.pos += 1;
            self.expect_symbol("(")?;
            Operand::Token(self.name_list()?)
        } else {
            Operand::Column(self.name()?)
        };

        let op = match self.next() {
            Some(Token::Symbol("=")) => Op::Eq,
            Some(Token::Symbol(">")) => Op::Gt,
            Some(Token::Symbol(">=")) => Op::Ge,
            Some(Token::Symbol("<")) => Op::Lt,
            Some(Token::Symbol("<=")) => Op::Le,
            other => return Err(invalid(format!("expected operator, found {other:?}"))),
        };

        let rhs = if self.peek_keyword("TOKEN") {
            self.pos += 1;
            self.expect_symbol("(")?;
            let mut terms = vec![self.term()?];
            while self.eat_symbol(",") {
                terms.push(self.term()?);
            }
            self.expect_symbol(")")?;
            Rhs::Token(terms)
        } else {
            Rhs::Term(self.term()?)
        };

        Ok(Condition { lhs, op, rhs })
    }

    // ------------------------------------------------------------------
    // Pieces
    // ------------------------------------------------------------------

    fn table_ref(&mut self) -> Result<TableRef, StoreError> {
        let first = self.name()?;
        if self.eat_symbol(".") {
            return Ok(TableRef {
                keyspace: Some(first),
                name: self.name()?,
            });
        }

        Ok(TableRef {
            keyspace: None,
            name: first,
        })
    }

    // comma-separated names up to and including the closing paren
    fn name_list(&mut self) -> Result<Vec<String>, StoreError> {
        let mut names = vec![self.name()?];
        while self.eat_symbol(",") {
            names.push(self.name()?);
        }
        self.expect_symbol(")")?;

        Ok(names)
    }

    fn name(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.to_ascii_lowercase()),
            Some(Token::Quoted(q)) => Ok(q),
            other => Err(invalid(format!("expected identifier, found {other:?}"))),
        }
    }

    fn field_type(&mut self) -> Result<FieldType, StoreError> {
        let word = self.word()?;
        FieldType::from_str(&word).map_err(|_| invalid(format!("unknown column type {word}")))
    }

    fn term(&mut self) -> Result<Term, StoreError> {
        match self.next() {
            Some(Token::Placeholder) => {
                let index = self.placeholders;
                self.placeholders += 1;
                Ok(Term::Placeholder(index))
            }
            Some(Token::Text(raw)) => Ok(Term::Literal { raw, quoted: true }),
            Some(Token::Word(raw)) => Ok(Term::Literal { raw, quoted: false }),
            other => Err(invalid(format!("expected value, found {other:?}"))),
        }
    }

    fn word(&mut self) -> Result<String, StoreError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(invalid(format!("expected keyword, found {other:?}"))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    // all-or-nothing match of a keyword sequence
    fn eat_keywords(&mut self, keywords: &[&str]) -> bool {
        let found = keywords.iter().enumerate().all(|(i, keyword)| {
            matches!(self.tokens.get(self.pos + i), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
        });
        if found {
            self.pos += keywords.len();
        }
        found
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), StoreError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(invalid(format!("expected {keyword}, found {:?}", self.peek())))
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        let found = matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_symbol(&mut self, symbol: &str) -> Result<(), StoreError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(invalid(format!("expected '{symbol}', found {:?}", self.peek())))
        }
    }

    // options clauses (replication, compaction) carry nothing the store models
    fn skip_rest(&mut self) {
        while let Some(token) = self.peek() {
            if *token == Token::Symbol(";") {
                break;
            }
            self.pos += 1;
        }
    }
}

///
/// TESTS
///
