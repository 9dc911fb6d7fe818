// Built-ins that look inside records: template projection, filtering,
// grouping and numeric aggregation.

use std::cmp::Ordering;

use regex::Regex;

use super::{argv, input, wrap, wrap_all};
use crate::error::ShellError;
use crate::pipeline;
use crate::template::Template;
use crate::value::{Record, Value};

// map arguments: bare `name` selects the field, `key=template` renders.
fn parse_mappings(args: &[String]) -> Result<Vec<(String, Template)>, ShellError> {
    if args.is_empty() {
        return Err(ShellError::invalid_parameter("args"));
    }
    Ok(args
        .iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, template)) => (key.to_string(), Template::parse(template)),
            None => (arg.clone(), Template::parse(&format!("{{{arg}}}"))),
        })
        .collect())
}

pub fn map(params: &Record) -> Result<Vec<Record>, ShellError> {
    let mappings = parse_mappings(&argv(params))?;
    let out = input(params)
        .into_iter()
        .map(|record| {
            let mut mapped = Record::new();
            for (key, template) in &mappings {
                if let Some(value) = template.eval(&record) {
                    mapped.insert(key.clone(), value);
                }
            }
            mapped
        })
        .collect();
    Ok(wrap_all(out))
}

pub fn filter_map(params: &Record) -> Result<Vec<Record>, ShellError> {
    let mappings = parse_mappings(&argv(params))?;
    let mut out = Vec::new();
    'records: for record in input(params) {
        let mut mapped = Record::new();
        for (key, template) in &mappings {
            match template.eval(&record) {
                Some(value) => mapped.insert(key.clone(), value),
                None => continue 'records,
            }
        }
        out.push(mapped);
    }
    Ok(wrap_all(out))
}

pub fn grep(params: &Record) -> Result<Vec<Record>, ShellError> {
    let mut filters = Vec::new();
    for arg in argv(params) {
        match arg.split_once('=') {
            Some((field, pattern)) => filters.push((field.to_string(), pattern.to_string())),
            None => return Err(ShellError::invalid_parameter(arg)),
        }
    }
    let out = input(params)
        .into_iter()
        .filter(|record| {
            filters.iter().all(|(field, pattern)| {
                record
                    .get_path(field)
                    .map(|value| value.render().contains(pattern.as_str()))
                    .unwrap_or(false)
            })
        })
        .collect();
    Ok(wrap_all(out))
}

enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Match(Box<Regex>),
}

struct Condition {
    path: String,
    op: Op,
    rhs: String,
}

// Longest operators first so `>=` is not read as `>`.
const OPERATORS: &[&str] = &[">=", "<=", "!=", ">", "<", "~", "="];

fn parse_conditions(args: &[String]) -> Result<Vec<Condition>, ShellError> {
    if args.is_empty() {
        return Err(ShellError::invalid_parameter("args"));
    }
    let mut conditions = Vec::new();
    for arg in args {
        let Some((token, at)) = OPERATORS
            .iter()
            .find_map(|op| arg.find(op).filter(|at| *at > 0).map(|at| (*op, at)))
        else {
            return Err(ShellError::invalid_parameter(arg.clone()));
        };
        let path = arg[..at].to_string();
        let rhs = arg[at + token.len()..].to_string();
        let op = match token {
            "=" => Op::Eq,
            "!=" => Op::Ne,
            ">" => Op::Gt,
            "<" => Op::Lt,
            ">=" => Op::Ge,
            "<=" => Op::Le,
            "~" => Op::Match(Box::new(
                Regex::new(&rhs).map_err(|_| ShellError::invalid_parameter(arg.clone()))?,
            )),
            _ => unreachable!(),
        };
        conditions.push(Condition { path, op, rhs });
    }
    Ok(conditions)
}

fn condition_holds(condition: &Condition, record: &Record) -> bool {
    let Some(value) = record.get_path(&condition.path) else {
        return false;
    };
    match &condition.op {
        Op::Eq => value.render() == condition.rhs,
        Op::Ne => value.render() != condition.rhs,
        Op::Match(regex) => regex.is_match(&value.render()),
        ordered => {
            let ordering = match (value.as_number(), condition.rhs.parse::<f64>().ok()) {
                (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs),
                _ => Some(value.render().cmp(&condition.rhs)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match ordered {
                Op::Gt => ordering == Ordering::Greater,
                Op::Lt => ordering == Ordering::Less,
                Op::Ge => ordering != Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
                _ => unreachable!(),
            }
        }
    }
}

pub fn where_(params: &Record) -> Result<Vec<Record>, ShellError> {
    let conditions = parse_conditions(&argv(params))?;
    let out = input(params)
        .into_iter()
        .filter(|record| {
            conditions
                .iter()
                .all(|condition| condition_holds(condition, record))
        })
        .collect();
    Ok(wrap_all(out))
}

pub fn group(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let field = args
        .first()
        .ok_or_else(|| ShellError::invalid_parameter("args"))?;

    // First-appearance order, keyed by canonical rendering.
    let mut groups: Vec<(Option<Value>, i64)> = Vec::new();
    let mut index: Vec<Option<String>> = Vec::new();
    for record in input(params) {
        let value = record.get_path(field).cloned();
        let key = value.as_ref().map(Value::canonical);
        match index.iter().position(|k| *k == key) {
            Some(at) => groups[at].1 += 1,
            None => {
                index.push(key);
                groups.push((value, 1));
            }
        }
    }

    let out = groups
        .into_iter()
        .map(|(value, count)| {
            let mut record = Record::new();
            if let Some(value) = value {
                record.insert(field.clone(), value);
            }
            record.insert("count", Value::Int(count));
            record
        })
        .collect();
    Ok(wrap_all(out))
}

pub fn sum(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let field = args
        .first()
        .ok_or_else(|| ShellError::invalid_parameter("args"))?;

    let mut total = 0.0_f64;
    let mut integral = true;
    for record in input(params) {
        let Some(n) = record.get_path(field).and_then(Value::as_number) else {
            continue;
        };
        total += n;
        if n.fract() != 0.0 {
            integral = false;
        }
    }

    let value = if integral && total >= i64::MIN as f64 && total <= i64::MAX as f64 {
        Value::Int(total as i64)
    } else {
        Value::Float(total)
    };
    let mut record = Record::new();
    record.insert("sum", value);
    Ok(vec![wrap(record)])
}

// Numerics order before strings; a missing field competes as the empty
// string.
enum Rank {
    Number(f64),
    Text(String),
}

fn rank(record: &Record, field: &str) -> Rank {
    match record.get_path(field) {
        Some(value) => match value.as_number() {
            Some(n) => Rank::Number(n),
            None => Rank::Text(value.render()),
        },
        None => Rank::Text(String::new()),
    }
}

fn compare_ranks(a: &Rank, b: &Rank) -> Ordering {
    match (a, b) {
        (Rank::Number(x), Rank::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Rank::Number(_), Rank::Text(_)) => Ordering::Less,
        (Rank::Text(_), Rank::Number(_)) => Ordering::Greater,
        (Rank::Text(x), Rank::Text(y)) => x.cmp(y),
    }
}

fn extremum(params: &Record, keep: Ordering) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    let field = args
        .first()
        .ok_or_else(|| ShellError::invalid_parameter("args"))?;

    let mut winner: Option<(Rank, Record)> = None;
    for record in input(params) {
        let contender = rank(&record, field);
        // Strictly better only, so ties keep the earliest record.
        let better = match &winner {
            None => true,
            Some((best, _)) => compare_ranks(&contender, best) == keep,
        };
        if better {
            winner = Some((contender, record));
        }
    }
    Ok(winner.map(|(_, record)| vec![wrap(record)]).unwrap_or_default())
}

pub fn min(params: &Record) -> Result<Vec<Record>, ShellError> {
    extremum(params, Ordering::Less)
}

pub fn max(params: &Record) -> Result<Vec<Record>, ShellError> {
    extremum(params, Ordering::Greater)
}

pub fn foreach(params: &Record) -> Result<Vec<Record>, ShellError> {
    let args = argv(params);
    if args.is_empty() {
        return Err(ShellError::invalid_parameter("args"));
    }
    let template = Template::parse(&args.join(" "));
    let mut out = Vec::new();
    for record in input(params) {
        let line = template.substitute_quoted(&record);
        tracing::debug!(%line, "foreach pipeline");
        out.extend(pipeline::execute(&line)?);
    }
    Ok(wrap_all(out))
}
