//! Prepared statements.
//!
//! A statement names tables and columns only; every value comes from the
//! positional parameters passed alongside it, so operator input never
//! becomes part of a statement. Parameters are consumed in this order:
//!
//! - `Insert`: one per column, trailing columns may be left to defaults
//! - `Select`, `Delete`: one per predicate operand
//! - `Update`: one per assignment, then one per predicate operand

/// A filter on a single column. Predicates of a statement are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = ?`
    Eq(String),
    /// `column < ?`
    Lt(String),
    /// `column BETWEEN ? AND ?`, inclusive
    Between(String),
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq(c) | Predicate::Lt(c) | Predicate::Between(c) => c,
        }
    }

    /// Number of parameters the predicate consumes
    pub fn arity(&self) -> usize {
        match self {
            Predicate::Eq(_) | Predicate::Lt(_) => 1,
            Predicate::Between(_) => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `column = ?`
    Set(String),
    /// `column = column + ?`, integer columns only
    Increment(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
}

impl Insert {
    pub fn new(table: &str) -> Self {
        Self { table: table.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub filter: Vec<Predicate>,
    pub order_by: Vec<(String, OrderDirection)>,
    /// Claim every returned row for the transaction (`SELECT ... FOR UPDATE`)
    pub for_update: bool,
}

impl Select {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: Vec::new(),
            order_by: Vec::new(),
            for_update: false,
        }
    }

    pub fn where_eq(mut self, column: &str) -> Self {
        self.filter.push(Predicate::Eq(column.to_string()));
        self
    }

    pub fn where_lt(mut self, column: &str) -> Self {
        self.filter.push(Predicate::Lt(column.to_string()));
        self
    }

    pub fn where_between(mut self, column: &str) -> Self {
        self.filter.push(Predicate::Between(column.to_string()));
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub filter: Vec<Predicate>,
}

impl Update {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            assignments: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str) -> Self {
        self.assignments.push(Assignment::Set(column.to_string()));
        self
    }

    pub fn increment(mut self, column: &str) -> Self {
        self.assignments.push(Assignment::Increment(column.to_string()));
        self
    }

    pub fn where_eq(mut self, column: &str) -> Self {
        self.filter.push(Predicate::Eq(column.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Vec<Predicate>,
}

impl Delete {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: Vec::new(),
        }
    }

    pub fn where_eq(mut self, column: &str) -> Self {
        self.filter.push(Predicate::Eq(column.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(Insert),
    Select(Select),
    Update(Update),
    Delete(Delete),
}

impl From<Insert> for Statement {
    fn from(value: Insert) -> Self {
        Statement::Insert(value)
    }
}

impl From<Select> for Statement {
    fn from(value: Select) -> Self {
        Statement::Select(value)
    }
}

impl From<Update> for Statement {
    fn from(value: Update) -> Self {
        Statement::Update(value)
    }
}

impl From<Delete> for Statement {
    fn from(value: Delete) -> Self {
        Statement::Delete(value)
    }
}
