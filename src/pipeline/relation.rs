// SPDX-License-Identifier: Apache-2.0

//! Relational plan for view definitions
//!
//! A [`Relation`] is a tree of projected table scans combined with equality
//! inner joins. It is rendered into a single `SELECT` whose joins are laid
//! out left to right; since every join is inner, the order in which
//! conditions are attached does not change the result.
//!
//! When both sides of a join expose a column with the same name, the left
//! side's column keeps the name and the right side's copy is hidden from
//! later joins and from the final projection.

use std::collections::HashMap;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::sql::validate_identifier;

/// Scalar expression over a scan's source columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Column(String),
    ToDate(Box<Expr>),
}

impl Expr {
    fn render(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::ToDate(inner) => format!("TO_DATE({})", inner.render()),
        }
    }

    fn validate(&self) -> EngineResult<()> {
        match self {
            Expr::Column(name) => validate_identifier(name).map(|_| ()),
            Expr::ToDate(inner) => inner.validate(),
        }
    }
}

/// One output column of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    expr: Expr,
    alias: Option<String>,
}

impl Projection {
    /// Renames the output column
    pub fn alias(mut self, name: &str) -> Self {
        self.alias = Some(name.to_string());
        self
    }

    /// Name the column is visible under after the scan
    pub fn output_name(&self) -> EngineResult<&str> {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => Ok(alias),
            (None, Expr::Column(name)) => Ok(name),
            (None, expr) => Err(EngineError::validation(format!(
                "expression {} needs an alias",
                expr.render()
            ))),
        }
    }

    fn render(&self) -> EngineResult<String> {
        let expr = self.expr.render();
        let name = self.output_name()?;
        Ok(if expr == name {
            expr
        } else {
            format!("{} AS {}", expr, name)
        })
    }
}

/// Plain column projection
pub fn col(name: &str) -> Projection {
    Projection {
        expr: Expr::Column(name.to_string()),
        alias: None,
    }
}

/// `TO_DATE(<column>)`; needs an alias
pub fn to_date(column: &str) -> Projection {
    Projection {
        expr: Expr::ToDate(Box::new(Expr::Column(column.to_string()))),
        alias: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Scan {
    table: String,
    alias: String,
    projections: Vec<Projection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Scan(Scan),
    Join {
        left: Box<Relation>,
        right: Box<Relation>,
        left_key: String,
        right_key: String,
    },
}

/// A visible output column and the scan alias it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    node: Node,
}

/// Equality condition between two qualified columns
struct Condition {
    left: String,
    right: String,
    attach_at: usize,
}

impl Relation {
    /// Projected scan of `table`, addressed as `alias` in the rendered SQL
    pub fn scan(table: &str, alias: &str, projections: Vec<Projection>) -> EngineResult<Self> {
        validate_identifier(table)?;
        validate_identifier(alias)?;
        if projections.is_empty() {
            return Err(EngineError::validation(format!("scan of {} selects no columns", table)));
        }

        let mut seen = Vec::with_capacity(projections.len());
        for projection in &projections {
            projection.expr.validate()?;
            let name = validate_identifier(projection.output_name()?)?;
            if seen.iter().any(|s: &&str| s.eq_ignore_ascii_case(name)) {
                return Err(EngineError::validation(format!(
                    "scan of {} projects {} twice",
                    table, name
                )));
            }
            seen.push(name);
        }

        Ok(Self {
            node: Node::Scan(Scan {
                table: table.to_string(),
                alias: alias.to_string(),
                projections,
            }),
        })
    }

    /// Inner join on `self.left_key = right.right_key`
    pub fn join(self, right: Relation, left_key: &str, right_key: &str) -> EngineResult<Self> {
        if self.resolve(left_key).is_none() {
            return Err(EngineError::validation(format!(
                "join key {} not found on the left side",
                left_key
            )));
        }
        if right.resolve(right_key).is_none() {
            return Err(EngineError::validation(format!(
                "join key {} not found on the right side",
                right_key
            )));
        }

        let left_aliases = self.aliases();
        if let Some(dup) = right.aliases().into_iter().find(|a| left_aliases.contains(a)) {
            return Err(EngineError::validation(format!("alias {} used twice", dup)));
        }

        Ok(Self {
            node: Node::Join {
                left: Box::new(self),
                right: Box::new(right),
                left_key: left_key.to_string(),
                right_key: right_key.to_string(),
            },
        })
    }

    /// Visible columns in order, left side first
    pub fn columns(&self) -> Vec<ResolvedColumn> {
        match &self.node {
            Node::Scan(scan) => scan
                .projections
                .iter()
                .filter_map(|p| p.output_name().ok())
                .map(|name| ResolvedColumn {
                    name: name.to_string(),
                    source: scan.alias.clone(),
                })
                .collect(),
            Node::Join { left, right, .. } => {
                let mut columns = left.columns();
                for column in right.columns() {
                    if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                        columns.push(column);
                    }
                }
                columns
            }
        }
    }

    /// Scan alias that provides the visible column `name`
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.columns()
            .into_iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.source)
    }

    fn aliases(&self) -> Vec<String> {
        self.scans().into_iter().map(|s| s.alias.clone()).collect()
    }

    fn scans(&self) -> Vec<&Scan> {
        match &self.node {
            Node::Scan(scan) => vec![scan],
            Node::Join { left, right, .. } => {
                let mut scans = left.scans();
                scans.extend(right.scans());
                scans
            }
        }
    }

    fn conditions(&self, positions: &HashMap<String, usize>, out: &mut Vec<Condition>) {
        if let Node::Join {
            left,
            right,
            left_key,
            right_key,
        } = &self.node
        {
            left.conditions(positions, out);
            right.conditions(positions, out);

            // Keys were resolved when the join was built.
            if let (Some(l), Some(r)) = (left.resolve(left_key), right.resolve(right_key)) {
                let attach_at = positions[&l].max(positions[&r]);
                out.push(Condition {
                    left: format!("{}.{}", l, left_key),
                    right: format!("{}.{}", r, right_key),
                    attach_at,
                });
            }
        }
    }

    /// Renders `SELECT <columns> FROM ...` for the given visible columns
    pub fn select(&self, columns: &[&str]) -> EngineResult<String> {
        if columns.is_empty() {
            return Err(EngineError::validation("final projection selects no columns"));
        }

        let mut select_list = Vec::with_capacity(columns.len());
        for name in columns {
            let source = self.resolve(name).ok_or_else(|| {
                EngineError::validation(format!("column {} is not produced by any input", name))
            })?;
            select_list.push(format!("    {}.{}", source, name));
        }

        let scans = self.scans();
        let positions: HashMap<String, usize> = scans
            .iter()
            .enumerate()
            .map(|(idx, scan)| (scan.alias.clone(), idx))
            .collect();
        let mut conditions = Vec::new();
        self.conditions(&positions, &mut conditions);

        let mut sql = format!("SELECT\n{}\n", select_list.join(",\n"));
        for (idx, scan) in scans.iter().enumerate() {
            let source = render_scan(scan)?;
            if idx == 0 {
                sql.push_str(&format!("FROM {}", source));
                continue;
            }

            let on: Vec<String> = conditions
                .iter()
                .filter(|c| c.attach_at == idx)
                .map(|c| format!("{} = {}", c.left, c.right))
                .collect();
            if on.is_empty() {
                sql.push_str(&format!("\nCROSS JOIN {}", source));
            } else {
                sql.push_str(&format!("\nINNER JOIN {} ON {}", source, on.join(" AND ")));
            }
        }
        Ok(sql)
    }
}

fn render_scan(scan: &Scan) -> EngineResult<String> {
    let projections = scan
        .projections
        .iter()
        .map(Projection::render)
        .collect::<EngineResult<Vec<_>>>()?;
    Ok(format!(
        "(SELECT {} FROM {}) AS {}",
        projections.join(", "),
        scan.table,
        scan.alias
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Relation {
        Relation::scan(
            "RAW.ORDERS",
            "o",
            vec![col("ORDER_ID"), col("CUSTOMER_ID"), to_date("ORDER_TS").alias("ORDER_DATE")],
        )
        .unwrap()
    }

    fn customers() -> Relation {
        Relation::scan(
            "RAW.CUSTOMERS",
            "c",
            vec![col("CUSTOMER_ID"), col("NAME").alias("CUSTOMER_NAME")],
        )
        .unwrap()
    }

    #[test]
    fn left_side_wins_name_collisions() {
        let joined = orders().join(customers(), "CUSTOMER_ID", "CUSTOMER_ID").unwrap();
        let names: Vec<String> = joined.columns().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["ORDER_ID", "CUSTOMER_ID", "ORDER_DATE", "CUSTOMER_NAME"]);
        assert_eq!(joined.resolve("customer_id").as_deref(), Some("o"));
        assert_eq!(joined.resolve("CUSTOMER_NAME").as_deref(), Some("c"));
    }

    #[test]
    fn renders_projected_scans_and_join() {
        let joined = orders().join(customers(), "CUSTOMER_ID", "CUSTOMER_ID").unwrap();
        let sql = joined.select(&["ORDER_ID", "ORDER_DATE", "CUSTOMER_NAME"]).unwrap();
        assert_eq!(
            sql,
            "SELECT\n    o.ORDER_ID,\n    o.ORDER_DATE,\n    c.CUSTOMER_NAME\n\
             FROM (SELECT ORDER_ID, CUSTOMER_ID, TO_DATE(ORDER_TS) AS ORDER_DATE FROM RAW.ORDERS) AS o\n\
             INNER JOIN (SELECT CUSTOMER_ID, NAME AS CUSTOMER_NAME FROM RAW.CUSTOMERS) AS c ON o.CUSTOMER_ID = c.CUSTOMER_ID"
        );
    }

    #[test]
    fn nested_right_join_attaches_conditions_in_scope() {
        let items = Relation::scan("RAW.ITEMS", "i", vec![col("ORDER_ID"), col("SKU")]).unwrap();
        let regions = Relation::scan("RAW.REGIONS", "r", vec![col("REGION_ID")]).unwrap();
        let stores =
            Relation::scan("RAW.STORES", "s", vec![col("ORDER_ID"), col("REGION_ID")]).unwrap();
        // i ⋈ (s ⋈ r): both conditions must come after the scans they use
        let inner = stores.join(regions, "REGION_ID", "REGION_ID").unwrap();
        let plan = items.join(inner, "ORDER_ID", "ORDER_ID").unwrap();

        let sql = plan.select(&["SKU", "REGION_ID"]).unwrap();
        let lines: Vec<&str> = sql.lines().collect();
        assert!(lines[4].starts_with("INNER JOIN (SELECT ORDER_ID, REGION_ID FROM RAW.STORES) AS s ON i.ORDER_ID = s.ORDER_ID"));
        assert!(lines[5].ends_with("AS r ON s.REGION_ID = r.REGION_ID"));
    }

    #[test]
    fn condition_without_own_scan_becomes_cross_join() {
        let a = Relation::scan("A", "a", vec![col("X")]).unwrap();
        let b = Relation::scan("B", "b", vec![col("Y")]).unwrap();
        let c = Relation::scan("C", "c", vec![col("X"), col("Y")]).unwrap();
        // a ⋈ (b ⋈ c on Y) on X: b has no condition with a, both attach at c
        let plan = a.join(b.join(c, "Y", "Y").unwrap(), "X", "X").unwrap();
        let sql = plan.select(&["X", "Y"]).unwrap();
        assert!(sql.contains("\nCROSS JOIN (SELECT Y FROM B) AS b\n"));
        assert!(sql.ends_with("AS c ON b.Y = c.Y AND a.X = c.X"));
    }

    #[test]
    fn validation_errors() {
        assert!(Relation::scan("T", "t", vec![]).is_err());
        assert!(Relation::scan("T", "t", vec![to_date("TS")]).is_err());
        assert!(Relation::scan("T", "t", vec![col("A"), col("a")]).is_err());
        assert!(Relation::scan("T", "bad alias", vec![col("A")]).is_err());

        assert!(orders().join(customers(), "MISSING", "CUSTOMER_ID").is_err());
        assert!(orders().join(customers(), "CUSTOMER_ID", "MISSING").is_err());
        assert!(orders().join(orders(), "ORDER_ID", "ORDER_ID").is_err());

        let joined = orders().join(customers(), "CUSTOMER_ID", "CUSTOMER_ID").unwrap();
        assert!(joined.select(&["NOPE"]).is_err());
        assert!(joined.select(&[]).is_err());
    }
}
