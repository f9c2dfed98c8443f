use crate::sampling::SamplingStrategy;
use serde::{Serialize, Serializer};
use std::fmt;

/// Parsed query representation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub shape: QueryShape,
    /// Explicit `USING <technique>` suffix
    pub using: Option<Technique>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryShape {
    /// COUNT DISTINCT col
    CountDistinct { column: String },
    /// MEDIAN col / QUANTILE col q
    Quantile { column: String, q: f64, median: bool },
    /// COUNT
    Count,
    /// SUM col / AVG col, optionally GROUP BY col
    Aggregate {
        function: AggregateFunction,
        column: String,
        group_by: Option<String>,
    },
    /// GROUPBY col: per-group row counts
    GroupCount { column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Sum,
    Avg,
}

/// Technique named in a `USING` clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Technique {
    Strategy(SamplingStrategy),
    CountMin,
    /// The primary sample table, whatever its strategy
    Sample,
}

impl QueryShape {
    pub fn name(&self) -> &'static str {
        match self {
            QueryShape::CountDistinct { .. } => "COUNT DISTINCT",
            QueryShape::Quantile { median: true, .. } => "MEDIAN",
            QueryShape::Quantile { .. } => "QUANTILE",
            QueryShape::Count => "COUNT",
            QueryShape::Aggregate {
                function: AggregateFunction::Sum,
                group_by: None,
                ..
            } => "SUM",
            QueryShape::Aggregate {
                function: AggregateFunction::Avg,
                group_by: None,
                ..
            } => "AVG",
            QueryShape::Aggregate {
                function: AggregateFunction::Sum,
                ..
            } => "SUM GROUP BY",
            QueryShape::Aggregate {
                function: AggregateFunction::Avg,
                ..
            } => "AVG GROUP BY",
            QueryShape::GroupCount { .. } => "GROUPBY",
        }
    }

    /// Whether the answer maps group keys to values
    pub fn is_grouped(&self) -> bool {
        matches!(
            self,
            QueryShape::GroupCount { .. }
                | QueryShape::Aggregate {
                    group_by: Some(_),
                    ..
                }
        )
    }

    /// Answered from a sample table (as opposed to a dedicated sketch)
    pub fn uses_samples(&self) -> bool {
        matches!(
            self,
            QueryShape::Count | QueryShape::Aggregate { .. } | QueryShape::GroupCount { .. }
        )
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
        }
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Technique::Strategy(strategy) => write!(f, "{}", strategy),
            Technique::CountMin => write!(f, "countmin"),
            Technique::Sample => write!(f, "sample"),
        }
    }
}

impl Serialize for Technique {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonical text, used as the normalized form of a query
impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryShape::CountDistinct { column } => write!(f, "COUNT DISTINCT {}", column),
            QueryShape::Quantile {
                column,
                median: true,
                ..
            } => write!(f, "MEDIAN {}", column),
            QueryShape::Quantile { column, q, .. } => write!(f, "QUANTILE {} {}", column, q),
            QueryShape::Count => write!(f, "COUNT"),
            QueryShape::Aggregate {
                function,
                column,
                group_by: None,
            } => write!(f, "{} {}", function, column),
            QueryShape::Aggregate {
                function,
                column,
                group_by: Some(group),
            } => write!(f, "{} {} GROUP BY {}", function, column, group),
            QueryShape::GroupCount { column } => write!(f, "GROUPBY {}", column),
        }
    }
}

impl fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shape)?;
        if let Some(technique) = &self.using {
            write!(f, " USING {}", technique)?;
        }
        Ok(())
    }
}

/// Parse a query string
///
/// ```text
/// COUNT DISTINCT <col>
/// COUNT
/// SUM <col> | AVG <col> [GROUP BY <col>]
/// GROUPBY <col>
/// MEDIAN <col>
/// QUANTILE <col> <q>
/// <query> USING <technique>
/// ```
///
/// Keywords are case-insensitive; column names are lowercased.
pub fn parse_query(text: &str) -> Result<ParsedQuery, ParseError> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ParseError::EmptyQuery);
    }

    let using = match tokens.iter().position(|t| t.eq_ignore_ascii_case("USING")) {
        Some(pos) if pos > 0 && pos + 2 == tokens.len() => {
            let technique = parse_technique(tokens[pos + 1])?;
            tokens.truncate(pos);
            Some(technique)
        }
        Some(_) => {
            return Err(ParseError::WrongArity {
                verb: "USING".into(),
                expected: "<query> USING <technique>",
            })
        }
        None => None,
    };

    let shape = parse_shape(&tokens)?;

    if let Some(technique) = using {
        check_technique(&shape, technique)?;
    }

    Ok(ParsedQuery { shape, using })
}

fn parse_shape(tokens: &[&str]) -> Result<QueryShape, ParseError> {
    let verb = tokens[0].to_uppercase();
    let column = |idx: usize| tokens[idx].to_lowercase();
    let keyword = |idx: usize, kw: &str| tokens.get(idx).is_some_and(|t| t.eq_ignore_ascii_case(kw));

    match verb.as_str() {
        "COUNT" => match tokens.len() {
            1 => Ok(QueryShape::Count),
            3 if keyword(1, "DISTINCT") => Ok(QueryShape::CountDistinct { column: column(2) }),
            _ => Err(ParseError::WrongArity {
                verb,
                expected: "COUNT or COUNT DISTINCT <col>",
            }),
        },
        "SUM" | "AVG" => {
            let function = if verb == "SUM" {
                AggregateFunction::Sum
            } else {
                AggregateFunction::Avg
            };
            match tokens.len() {
                2 => Ok(QueryShape::Aggregate {
                    function,
                    column: column(1),
                    group_by: None,
                }),
                5 if keyword(2, "GROUP") && keyword(3, "BY") => Ok(QueryShape::Aggregate {
                    function,
                    column: column(1),
                    group_by: Some(column(4)),
                }),
                _ => Err(ParseError::WrongArity {
                    verb,
                    expected: "<SUM|AVG> <col> [GROUP BY <col>]",
                }),
            }
        }
        "GROUPBY" => match tokens.len() {
            2 => Ok(QueryShape::GroupCount { column: column(1) }),
            _ => Err(ParseError::WrongArity {
                verb,
                expected: "GROUPBY <col>",
            }),
        },
        "MEDIAN" => match tokens.len() {
            2 => Ok(QueryShape::Quantile {
                column: column(1),
                q: 0.5,
                median: true,
            }),
            _ => Err(ParseError::WrongArity {
                verb,
                expected: "MEDIAN <col>",
            }),
        },
        "QUANTILE" => match tokens.len() {
            3 => {
                let q: f64 = tokens[2]
                    .parse()
                    .map_err(|_| ParseError::InvalidQuantile(tokens[2].to_string()))?;
                if q.is_nan() {
                    return Err(ParseError::InvalidQuantile(tokens[2].to_string()));
                }
                if !(0.0..=1.0).contains(&q) {
                    return Err(ParseError::QuantileOutOfRange(q));
                }
                Ok(QueryShape::Quantile {
                    column: column(1),
                    q,
                    median: false,
                })
            }
            _ => Err(ParseError::WrongArity {
                verb,
                expected: "QUANTILE <col> <q>",
            }),
        },
        _ => Err(ParseError::UnsupportedVerb(tokens[0].to_string())),
    }
}

fn parse_technique(token: &str) -> Result<Technique, ParseError> {
    let lowered = token.to_lowercase();
    match lowered.as_str() {
        "countmin" | "count-min" | "cms" => Ok(Technique::CountMin),
        "sample" | "sampling" => Ok(Technique::Sample),
        _ => lowered
            .parse::<SamplingStrategy>()
            .map(Technique::Strategy)
            .map_err(|_| ParseError::UnsupportedTechnique(token.to_string())),
    }
}

fn check_technique(shape: &QueryShape, technique: Technique) -> Result<(), ParseError> {
    let applicable = match technique {
        Technique::CountMin => matches!(shape, QueryShape::GroupCount { .. }),
        Technique::Sample | Technique::Strategy(_) => shape.uses_samples(),
    };

    if applicable {
        Ok(())
    } else {
        Err(ParseError::TechniqueNotApplicable {
            technique: technique.to_string(),
            query: shape.name(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Empty query")]
    EmptyQuery,

    #[error("Unsupported query '{0}'; expected COUNT, COUNT DISTINCT, SUM, AVG, GROUPBY, MEDIAN or QUANTILE")]
    UnsupportedVerb(String),

    #[error("Malformed {verb} query, expected: {expected}")]
    WrongArity { verb: String, expected: &'static str },

    #[error("Quantile argument '{0}' is not a number")]
    InvalidQuantile(String),

    #[error("Quantile {0} is outside [0, 1]")]
    QuantileOutOfRange(f64),

    #[error("Unsupported technique '{0}'")]
    UnsupportedTechnique(String),

    #[error("Technique '{technique}' cannot answer {query} queries")]
    TechniqueNotApplicable {
        technique: String,
        query: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_distinct() {
        let query = parse_query("count distinct Category").unwrap();
        assert_eq!(
            query.shape,
            QueryShape::CountDistinct {
                column: "category".into()
            }
        );
        assert_eq!(query.using, None);
    }

    #[test]
    fn test_sum_group_by() {
        let query = parse_query("SUM amount GROUP BY category").unwrap();
        assert_eq!(
            query.shape,
            QueryShape::Aggregate {
                function: AggregateFunction::Sum,
                column: "amount".into(),
                group_by: Some("category".into()),
            }
        );
        assert!(query.shape.is_grouped());
    }

    #[test]
    fn test_median_and_quantile() {
        let median = parse_query("MEDIAN amount").unwrap();
        assert!(matches!(
            median.shape,
            QueryShape::Quantile { q, median: true, .. } if q == 0.5
        ));

        let p90 = parse_query("quantile amount 0.9").unwrap();
        assert!(matches!(
            p90.shape,
            QueryShape::Quantile { q, median: false, .. } if q == 0.9
        ));
    }

    #[test]
    fn test_supplemented_forms() {
        assert_eq!(parse_query("COUNT").unwrap().shape, QueryShape::Count);
        assert_eq!(
            parse_query("GROUPBY category").unwrap().shape,
            QueryShape::GroupCount {
                column: "category".into()
            }
        );
        assert!(matches!(
            parse_query("AVG value").unwrap().shape,
            QueryShape::Aggregate {
                function: AggregateFunction::Avg,
                group_by: None,
                ..
            }
        ));
    }

    #[test]
    fn test_using_clause() {
        let query = parse_query("SUM amount USING Reservoir").unwrap();
        assert_eq!(
            query.using,
            Some(Technique::Strategy(SamplingStrategy::Reservoir))
        );

        let query = parse_query("GROUPBY category using countmin").unwrap();
        assert_eq!(query.using, Some(Technique::CountMin));
    }

    #[test]
    fn test_rejects_quantile_out_of_range() {
        assert_eq!(
            parse_query("QUANTILE amount 1.5"),
            Err(ParseError::QuantileOutOfRange(1.5))
        );
        assert!(matches!(
            parse_query("QUANTILE amount high"),
            Err(ParseError::InvalidQuantile(_))
        ));
        assert!(matches!(
            parse_query("QUANTILE amount NaN"),
            Err(ParseError::InvalidQuantile(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_verb() {
        assert_eq!(
            parse_query("FOO bar"),
            Err(ParseError::UnsupportedVerb("FOO".into()))
        );
        assert_eq!(parse_query("   "), Err(ParseError::EmptyQuery));
    }

    #[test]
    fn test_rejects_wrong_arity() {
        for text in [
            "COUNT DISTINCT",
            "COUNT DISTINCT a b",
            "SUM",
            "SUM amount GROUP category",
            "MEDIAN",
            "QUANTILE amount",
            "GROUPBY",
            "USING random",
            "SUM amount USING",
        ] {
            assert!(
                matches!(parse_query(text), Err(ParseError::WrongArity { .. })),
                "{}",
                text
            );
        }
    }

    #[test]
    fn test_rejects_inapplicable_technique() {
        assert!(matches!(
            parse_query("SUM amount USING countmin"),
            Err(ParseError::TechniqueNotApplicable { .. })
        ));
        assert!(matches!(
            parse_query("MEDIAN amount USING random"),
            Err(ParseError::TechniqueNotApplicable { .. })
        ));
        assert_eq!(
            parse_query("COUNT USING magic"),
            Err(ParseError::UnsupportedTechnique("magic".into()))
        );
    }

    #[test]
    fn test_canonical_display() {
        let query = parse_query("sum  Amount   group by CATEGORY using stratified").unwrap();
        assert_eq!(
            query.to_string(),
            "SUM amount GROUP BY category USING stratified"
        );
        assert_eq!(
            parse_query("QUANTILE amount 0.25").unwrap().to_string(),
            "QUANTILE amount 0.25"
        );
    }
}
