//! Aggregation pipeline: `$match`, `$group`, `$sort`,
//! `$skip`, `$limit`, `$project`, run stage by stage over an in-memory
//! document list.
//!
//! `$group`'s accumulators mirror the small operator-enum style
//! `laura_query::update` already uses for `$set`/`$inc`/etc, rather than
//! matching on a raw operator string at every call site.

use bson::{Bson, Document};
use laura_query::{apply_projection, parse_filter, parse_projection, parse_sort};

use crate::error::DbError;

#[derive(Debug, Clone, Copy)]
enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl Accumulator {
    fn parse(op: &str) -> Result<Self, DbError> {
        match op {
            "$sum" => Ok(Accumulator::Sum),
            "$avg" => Ok(Accumulator::Avg),
            "$min" => Ok(Accumulator::Min),
            "$max" => Ok(Accumulator::Max),
            "$count" => Ok(Accumulator::Count),
            other => Err(DbError::InvalidArgument(format!("unknown accumulator: {other}"))),
        }
    }
}

/// Runs `pipeline` over `docs`, a stage document at a time.
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>, DbError> {
    for stage in pipeline {
        let (op, value) = stage
            .iter()
            .next()
            .ok_or_else(|| DbError::InvalidArgument("empty pipeline stage".into()))?;
        docs = match op.as_str() {
            "$match" => {
                let Bson::Document(filter_doc) = value else {
                    return Err(DbError::InvalidArgument("$match value must be a document".into()));
                };
                let filter = parse_filter(filter_doc)?;
                docs.into_iter().filter(|d| filter.evaluate(d)).collect()
            }
            "$sort" => {
                let Bson::Document(sort_doc) = value else {
                    return Err(DbError::InvalidArgument("$sort value must be a document".into()));
                };
                let sort = parse_sort(sort_doc)?;
                let mut docs = docs;
                sort.apply(&mut docs);
                docs
            }
            "$skip" => {
                let n = as_usize(value, "$skip")?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = as_usize(value, "$limit")?;
                docs.into_iter().take(n).collect()
            }
            "$project" => {
                let Bson::Document(proj_doc) = value else {
                    return Err(DbError::InvalidArgument("$project value must be a document".into()));
                };
                let projection = parse_projection(proj_doc)?;
                docs.iter().map(|d| apply_projection(d, &projection)).collect()
            }
            "$group" => {
                let Bson::Document(group_doc) = value else {
                    return Err(DbError::InvalidArgument("$group value must be a document".into()));
                };
                apply_group(&docs, group_doc)?
            }
            other => return Err(DbError::InvalidArgument(format!("unknown pipeline stage: {other}"))),
        };
    }
    Ok(docs)
}

fn as_usize(value: &Bson, stage: &str) -> Result<usize, DbError> {
    match value {
        Bson::Int32(n) if *n >= 0 => Ok(*n as usize),
        Bson::Int64(n) if *n >= 0 => Ok(*n as usize),
        other => Err(DbError::InvalidArgument(format!(
            "{stage} value must be a non-negative integer, got {other:?}"
        ))),
    }
}

fn eval_group_expr(expr: &Bson, doc: &Document) -> Bson {
    match expr {
        Bson::String(s) if s.starts_with('$') => {
            laura_query::value::extract(doc, &s[1..]).cloned().unwrap_or(Bson::Null)
        }
        other => other.clone(),
    }
}

fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn apply_group(docs: &[Document], spec: &Document) -> Result<Vec<Document>, DbError> {
    let id_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);

    let mut fields: Vec<(String, Accumulator, Bson)> = Vec::new();
    for (name, def) in spec {
        if name == "_id" {
            continue;
        }
        let Bson::Document(opdoc) = def else {
            return Err(DbError::InvalidArgument(format!(
                "$group field '{name}' must be an accumulator document"
            )));
        };
        let (op, expr) = opdoc
            .iter()
            .next()
            .ok_or_else(|| DbError::InvalidArgument(format!("$group field '{name}' has no accumulator")))?;
        fields.push((name.clone(), Accumulator::parse(op)?, expr.clone()));
    }

    // Groups keyed by a debug-formatted snapshot of the `_id` value, which is
    // stable across a single pipeline run though not meant for persistence.
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, (Bson, Vec<&Document>)> = std::collections::HashMap::new();
    for doc in docs {
        let id_val = eval_group_expr(&id_expr, doc);
        let key = format!("{id_val:?}");
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key.clone());
                (id_val, Vec::new())
            })
            .1
            .push(doc);
    }

    let mut out = Vec::with_capacity(order.len());
    for key in order {
        let (id_val, members) = &groups[&key];
        let mut result = Document::new();
        result.insert("_id", id_val.clone());
        for (name, acc, expr) in &fields {
            let value = match acc {
                Accumulator::Count => Bson::Int64(members.len() as i64),
                Accumulator::Sum | Accumulator::Avg => {
                    let values: Vec<f64> = members
                        .iter()
                        .map(|d| as_f64(&eval_group_expr(expr, d)).unwrap_or(0.0))
                        .collect();
                    let total: f64 = values.iter().sum();
                    match acc {
                        Accumulator::Sum => Bson::Double(total),
                        Accumulator::Avg => {
                            let n = values.len().max(1) as f64;
                            Bson::Double(total / n)
                        }
                        _ => unreachable!(),
                    }
                }
                Accumulator::Min | Accumulator::Max => {
                    let mut values: Vec<Bson> = members.iter().map(|d| eval_group_expr(expr, d)).collect();
                    values.sort_by(laura_query::value::compare_values);
                    match acc {
                        Accumulator::Min => values.first().cloned().unwrap_or(Bson::Null),
                        Accumulator::Max => values.last().cloned().unwrap_or(Bson::Null),
                        _ => unreachable!(),
                    }
                }
            };
            result.insert(name.clone(), value);
        }
        out.push(result);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> Vec<Document> {
        vec![
            doc! { "status": "active", "age": 20 },
            doc! { "status": "active", "age": 30 },
            doc! { "status": "inactive", "age": 40 },
        ]
    }

    #[test]
    fn match_stage_filters() {
        let pipeline = vec![doc! { "$match": { "status": "active" } }];
        let out = run_pipeline(sample(), &pipeline).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn group_with_count_and_avg() {
        let pipeline = vec![doc! {
            "$group": {
                "_id": "$status",
                "count": { "$count": 1 },
                "avgAge": { "$avg": "$age" },
            }
        }];
        let out = run_pipeline(sample(), &pipeline).unwrap();
        assert_eq!(out.len(), 2);
        let active = out.iter().find(|d| d.get_str("_id").unwrap() == "active").unwrap();
        assert_eq!(active.get_i64("count").unwrap(), 2);
        assert_eq!(active.get_f64("avgAge").unwrap(), 25.0);
    }

    #[test]
    fn group_min_max() {
        let pipeline = vec![doc! {
            "$group": {
                "_id": Bson::Null,
                "youngest": { "$min": "$age" },
                "oldest": { "$max": "$age" },
            }
        }];
        let out = run_pipeline(sample(), &pipeline).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_i32("youngest").unwrap(), 20);
        assert_eq!(out[0].get_i32("oldest").unwrap(), 40);
    }

    #[test]
    fn sort_limit_skip_pipeline() {
        let pipeline = vec![
            doc! { "$sort": { "age": -1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 1 },
        ];
        let out = run_pipeline(sample(), &pipeline).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_i32("age").unwrap(), 30);
    }

    #[test]
    fn unknown_stage_errors() {
        let pipeline = vec![doc! { "$bogus": {} }];
        assert!(run_pipeline(sample(), &pipeline).is_err());
    }
}
