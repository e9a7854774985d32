//! Style model: feature-type styles, scale-ranged rules and symbolizers.
//!
//! Styles are owned by the layer's [`StyleBlackboard`](crate::layer::StyleBlackboard)
//! and are read-only to the rendering pipeline.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scale::{DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StyleExtractionError {
    #[error("style '{0}' has no feature type style")]
    NoFeatureTypeStyle(String),

    #[error("feature type style '{0}' has no rules")]
    NoRule(String),

    #[error("malformed color mask '{0}', expected r:g:b")]
    MalformedColorMask(String),
}

// ── Expressions ───────────────────────────────────────────────────────

/// A value produced by evaluating an [`Expression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Attribute values an expression may read from.
pub type EvaluationContext = HashMap<String, Value>;

/// A style parameter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Value),
    /// Reads a named attribute from the evaluation context.
    Property(String),
}

impl Expression {
    pub fn literal(value: f64) -> Self {
        Expression::Literal(Value::Number(value))
    }

    /// Evaluates against `context`; unresolved properties yield [`Value::Null`].
    pub fn evaluate(&self, context: Option<&EvaluationContext>) -> Value {
        match self {
            Expression::Literal(v) => v.clone(),
            Expression::Property(name) => context
                .and_then(|ctx| ctx.get(name))
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

// ── Symbolizers and rules ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterSymbolizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<Expression>,
}

impl RasterSymbolizer {
    pub fn with_opacity(opacity: f64) -> Self {
        Self {
            opacity: Some(Expression::literal(opacity)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Symbolizer {
    Raster(RasterSymbolizer),
    Point,
    Line,
    Polygon,
}

/// A rule with an optional visible scale-denominator range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scale_denominator: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scale_denominator: Option<f64>,
    #[serde(default)]
    pub symbolizers: Vec<Symbolizer>,
}

impl Rule {
    pub fn raster(symbolizer: RasterSymbolizer) -> Self {
        Self {
            symbolizers: vec![Symbolizer::Raster(symbolizer)],
            ..Default::default()
        }
    }

    pub fn with_scale_range(mut self, min: f64, max: f64) -> Self {
        self.min_scale_denominator = Some(min);
        self.max_scale_denominator = Some(max);
        self
    }

    pub fn min_scale(&self) -> f64 {
        self.min_scale_denominator.unwrap_or(DEFAULT_MIN_SCALE)
    }

    pub fn max_scale(&self) -> f64 {
        self.max_scale_denominator.unwrap_or(DEFAULT_MAX_SCALE)
    }

    /// The first symbolizer, if it is a raster symbolizer.
    pub fn raster_symbolizer(&self) -> Option<&RasterSymbolizer> {
        match self.symbolizers.first() {
            Some(Symbolizer::Raster(rs)) => Some(rs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTypeStyle {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub feature_type_styles: Vec<FeatureTypeStyle>,
}

impl Style {
    /// A single-rule raster style.
    pub fn raster(name: &str, rule: Rule) -> Self {
        Self {
            name: name.to_string(),
            feature_type_styles: vec![FeatureTypeStyle {
                name: name.to_string(),
                rules: vec![rule],
            }],
        }
    }

    /// The rule that governs raster rendering: first rule of the first feature type style.
    pub fn first_rule(&self) -> Result<&Rule, StyleExtractionError> {
        let fts = self
            .feature_type_styles
            .first()
            .ok_or_else(|| StyleExtractionError::NoFeatureTypeStyle(self.name.clone()))?;
        fts.rules
            .first()
            .ok_or_else(|| StyleExtractionError::NoRule(fts.name.clone()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// ── Color mask ────────────────────────────────────────────────────────

/// An RGB colour made fully transparent before a raster is painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorMask {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColorMask {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn matches(&self, rgb: [u8; 3]) -> bool {
        rgb == [self.r, self.g, self.b]
    }
}

impl FromStr for ColorMask {
    type Err = StyleExtractionError;

    /// Parses the blackboard form `r:g:b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || StyleExtractionError::MalformedColorMask(s.to_string());
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(malformed());
        }
        let mut rgb = [0u8; 3];
        for (slot, part) in rgb.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| malformed())?;
        }
        Ok(Self::new(rgb[0], rgb[1], rgb[2]))
    }
}

impl fmt::Display for ColorMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.r, self.g, self.b)
    }
}
