use crate::error::FinanceError;
use crate::model::{date, Amount, ExportTo, Location, Position};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// One income or expense entry as stored by the backend.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Transaction {
    pub(crate) id: String,
    pub(crate) date: NaiveDate,
    pub(crate) person: String,
    pub(crate) location: Location,
    pub(crate) position: Position,
    pub(crate) income: Amount,
    pub(crate) expense: Amount,
    /// Never absent, an entry without a comment has an empty string here.
    pub(crate) comment: String,
    pub(crate) taxable: bool,
    pub(crate) export_to: ExportTo,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        date: NaiveDate,
        person: impl Into<String>,
        location: Location,
        position: Position,
        income: Amount,
        expense: Amount,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            date,
            person: person.into(),
            location,
            position,
            income,
            expense,
            comment: comment.into(),
            taxable: false,
            export_to: ExportTo::Auto,
        }
    }

    /// Sets the tax flags, which `new` leaves at not taxable and `ExportTo::Auto`.
    pub fn with_tax(mut self, taxable: bool, export_to: ExportTo) -> Self {
        self.taxable = taxable;
        self.export_to = export_to;
        self
    }

    /// Reads one entry of the list endpoint:
    ///
    /// ```json
    /// {"id": 42, "orderdate": "2025-04-13", "who": "Bernd", "location": "Hollgasse 1/1",
    ///  "position": "Essen", "income": 0, "expense": "12.30", "comment": null,
    ///  "taxable": 1, "export_to": "auto"}
    /// ```
    ///
    /// `id`, `orderdate`, `who`, `income` and `expense` are required. A missing `location` or
    /// `position` falls back to the catalog default, a missing or null `comment` to `""`. A missing
    /// `taxable` reads as false and a missing or unknown `export_to` as `auto`.
    ///
    /// The id, person, location and position must fit on one line.
    pub fn from_record(record: &Value) -> Result<Self, FinanceError> {
        let fields = record
            .as_object()
            .ok_or_else(|| FinanceError::malformed(format!("expected an object, got {record}")))?;

        let id = match required(fields, ID)? {
            Value::String(s) if !s.is_empty() => single_line(ID, s)?.to_string(),
            Value::Number(n) => n.to_string(),
            other => return Err(invalid(ID, other)),
        };

        let date = required(fields, ORDERDATE)?
            .as_str()
            .and_then(date::parse_wire)
            .ok_or_else(|| invalid(ORDERDATE, &fields[ORDERDATE]))?;

        let person = required(fields, WHO)?
            .as_str()
            .ok_or_else(|| invalid(WHO, &fields[WHO]))?;
        let person = single_line(WHO, person)?.to_string();

        let income = amount(fields, INCOME)?;
        let expense = amount(fields, EXPENSE)?;

        let location: Location = match optional_str(fields, LOCATION) {
            Some(s) => catalog_value(single_line(LOCATION, s)?),
            None => Location::default(),
        };
        let position: Position = match optional_str(fields, POSITION) {
            Some(s) => catalog_value(single_line(POSITION, s)?),
            None => Position::default(),
        };
        let comment = optional_str(fields, COMMENT).unwrap_or_default().to_string();
        let taxable = fields.get(TAXABLE).is_some_and(flag);
        let export_to = optional_str(fields, EXPORT_TO)
            .and_then(|s| ExportTo::from_str(s).ok())
            .unwrap_or_default();

        Ok(Self {
            id,
            date,
            person,
            location,
            position,
            income,
            expense,
            comment,
            taxable,
            export_to,
        })
    }

    /// Renders the entry in the multi-line list format, one labeled line per field:
    ///
    /// ```text
    /// Id: 42
    /// Date: 2025-04-13
    /// Person: Bernd
    /// Location: Hollgasse 1/1
    /// Position: Essen
    /// Income: 0.00
    /// Expense: 12.30
    /// Taxable: false
    /// Export to: auto
    /// Comment: weekly shopping
    /// ```
    ///
    /// The comment comes last and is written verbatim, line breaks included.
    pub fn render(&self) -> String {
        format!(
            "{ID_LABEL}: {}\n{DATE_LABEL}: {}\n{PERSON_LABEL}: {}\n{LOCATION_LABEL}: {}\n\
             {POSITION_LABEL}: {}\n{INCOME_LABEL}: {}\n{EXPENSE_LABEL}: {}\n{TAXABLE_LABEL}: {}\n\
             {EXPORT_TO_LABEL}: {}\n{COMMENT_LABEL}: {}",
            self.id,
            date::format_wire(self.date),
            self.person,
            self.location,
            self.position,
            self.income,
            self.expense,
            self.taxable,
            self.export_to,
            self.comment,
        )
    }

    /// Parses the output of [`Transaction::render`] back into a transaction.
    ///
    /// The first seven lines are read in their fixed order and each must carry its label. Only the
    /// label is split off, so values keep inner whitespace. The `Taxable`, `Export to` and
    /// `Comment` lines may be missing. Everything after `Comment: ` is the comment, verbatim.
    pub fn parse_rendered(text: &str) -> Result<Self, FinanceError> {
        let mut lines = Vec::with_capacity(MANDATORY_LINES);
        let mut rest = Some(text);
        while lines.len() < MANDATORY_LINES {
            let Some(current) = rest else { break };
            let (line, next) = split_line(current);
            lines.push(line);
            rest = next;
        }
        if lines.len() < MANDATORY_LINES {
            return Err(FinanceError::malformed(format!(
                "expected at least {MANDATORY_LINES} lines, found {}",
                lines.len()
            )));
        }

        let id = labeled(lines[0], ID_LABEL)?;
        if id.is_empty() {
            return Err(FinanceError::malformed("the id is empty"));
        }
        let date_text = labeled(lines[1], DATE_LABEL)?;
        let date = date::parse_wire(date_text)
            .ok_or_else(|| FinanceError::malformed(format!("'{date_text}' is not a date")))?;
        let person = labeled(lines[2], PERSON_LABEL)?;
        let location = catalog_value(labeled(lines[3], LOCATION_LABEL)?);
        let position = catalog_value(labeled(lines[4], POSITION_LABEL)?);
        let income = text_amount(labeled(lines[5], INCOME_LABEL)?, INCOME_LABEL)?;
        let expense = text_amount(labeled(lines[6], EXPENSE_LABEL)?, EXPENSE_LABEL)?;

        let mut rest = rest.filter(|r| !r.is_empty());
        let taxable = match optional_line(&mut rest, TAXABLE_LABEL) {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => {
                return Err(FinanceError::malformed(format!(
                    "'{other}' is neither true nor false"
                )))
            }
        };
        let export_to = match optional_line(&mut rest, EXPORT_TO_LABEL) {
            Some(text) => ExportTo::from_str(text).map_err(|_| {
                FinanceError::malformed(format!("'{text}' is not an export target"))
            })?,
            None => ExportTo::default(),
        };
        let comment = match rest {
            Some(rest) => labeled(rest, COMMENT_LABEL)?.to_string(),
            None => String::new(),
        };

        Ok(Self {
            id: id.to_string(),
            date,
            person: person.to_string(),
            location,
            position,
            income,
            expense,
            comment,
            taxable,
            export_to,
        })
    }

    /// The form fields of a PUT to `/incomeexpense/put/{id}`.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::default();
        payload.push(ID, &self.id);
        payload.push(ORDERDATE, date::format_wire(self.date));
        payload.push(WHO, &self.person);
        payload.push(POSITION, self.position.display_name());
        payload.push(INCOME, self.income.to_string());
        payload.push(EXPENSE, self.expense.to_string());
        payload.push(LOCATION, self.location.display_name());
        payload.push(COMMENT, &self.comment);
        payload.push(TAXABLE, self.taxable.to_string());
        payload.push(EXPORT_TO, self.export_to.to_string());
        payload
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn person(&self) -> &str {
        &self.person
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn income(&self) -> Amount {
        self.income
    }

    pub fn expense(&self) -> Amount {
        self.expense
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn taxable(&self) -> bool {
        self.taxable
    }

    pub fn export_to(&self) -> ExportTo {
        self.export_to
    }
}

/// Form-encoded fields of a POST or PUT, kept in insertion order.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Payload(Vec<(String, String)>);

impl Payload {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.0
    }
}

fn required<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a Value, FinanceError> {
    match fields.get(name) {
        None | Some(Value::Null) => Err(FinanceError::malformed(format!(
            "the required field '{name}' is missing"
        ))),
        Some(value) => Ok(value),
    }
}

fn optional_str<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str)
}

fn amount(fields: &Map<String, Value>, name: &str) -> Result<Amount, FinanceError> {
    let value = required(fields, name)?;
    let amount = Amount::from_json(value).map_err(|_| invalid(name, value))?;
    if amount.is_negative() {
        return Err(invalid(name, value));
    }
    Ok(amount)
}

fn text_amount(text: &str, label: &str) -> Result<Amount, FinanceError> {
    match Amount::from_str(text) {
        Ok(amount) if !amount.is_negative() => Ok(amount),
        _ => Err(FinanceError::malformed(format!(
            "'{text}' is not a valid {label} amount"
        ))),
    }
}

/// The backend stores the flag as a number, older rows carry booleans or strings.
fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => s.eq_ignore_ascii_case("true") || s == "1",
        _ => false,
    }
}

fn single_line<'a>(name: &str, value: &'a str) -> Result<&'a str, FinanceError> {
    if value.contains(['\n', '\r']) {
        return Err(FinanceError::malformed(format!(
            "the field '{name}' spans more than one line"
        )));
    }
    Ok(value)
}

fn invalid(name: &str, value: &Value) -> FinanceError {
    FinanceError::malformed(format!("the field '{name}' has an unreadable value {value}"))
}

fn catalog_value<T: FromStr<Err = std::convert::Infallible>>(s: &str) -> T {
    T::from_str(s).unwrap_or_else(|never| match never {})
}

/// The first line of `text` without its line break, and what follows the break.
fn split_line(text: &str) -> (&str, Option<&str>) {
    match text.split_once('\n') {
        Some((line, rest)) => (line.strip_suffix('\r').unwrap_or(line), Some(rest)),
        None => (text, None),
    }
}

/// Consumes the next line of `rest` if it carries `label`.
fn optional_line<'a>(rest: &mut Option<&'a str>, label: &str) -> Option<&'a str> {
    let (line, next) = split_line((*rest)?);
    let value = labeled(line, label).ok()?;
    *rest = next.filter(|r| !r.is_empty());
    Some(value)
}

/// Splits `label: ` off `line` and returns the rest verbatim.
fn labeled<'a>(line: &'a str, label: &str) -> Result<&'a str, FinanceError> {
    let rest = line
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| {
            FinanceError::malformed(format!("expected a '{label}:' line, found '{line}'"))
        })?;
    Ok(rest.strip_prefix(' ').unwrap_or(rest))
}

const ID: &str = "id";
const ORDERDATE: &str = "orderdate";
const WHO: &str = "who";
const LOCATION: &str = "location";
const POSITION: &str = "position";
const INCOME: &str = "income";
const EXPENSE: &str = "expense";
const COMMENT: &str = "comment";
const TAXABLE: &str = "taxable";
const EXPORT_TO: &str = "export_to";

const ID_LABEL: &str = "Id";
const DATE_LABEL: &str = "Date";
const PERSON_LABEL: &str = "Person";
const LOCATION_LABEL: &str = "Location";
const POSITION_LABEL: &str = "Position";
const INCOME_LABEL: &str = "Income";
const EXPENSE_LABEL: &str = "Expense";
const COMMENT_LABEL: &str = "Comment";
const TAXABLE_LABEL: &str = "Taxable";
const EXPORT_TO_LABEL: &str = "Export to";

const MANDATORY_LINES: usize = 7;
