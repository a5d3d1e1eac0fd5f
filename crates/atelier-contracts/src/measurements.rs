use std::fmt;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementUnit {
    #[default]
    Cm,
    Inch,
}

impl MeasurementUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasurementUnit::Cm => "cm",
            MeasurementUnit::Inch => "inch",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
    pub unit: MeasurementUnit,
}

impl Measurement {
    /// Parses `label=value[unit]`, e.g. `chest=102cm` or `inseam=32in`.
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((label, value)) = raw.split_once('=') else {
            bail!("measurement '{raw}' must look like label=value");
        };
        let label = label.trim();
        if label.is_empty() {
            bail!("measurement '{raw}' has an empty label");
        }
        let value = value.trim().to_ascii_lowercase();
        let (number, unit) = if let Some(number) = value.strip_suffix("cm") {
            (number, MeasurementUnit::Cm)
        } else if let Some(number) = value
            .strip_suffix("inch")
            .or_else(|| value.strip_suffix("in"))
            .or_else(|| value.strip_suffix('"'))
        {
            (number, MeasurementUnit::Inch)
        } else {
            (value.as_str(), MeasurementUnit::Cm)
        };
        let value: f64 = number
            .trim()
            .parse()
            .with_context(|| format!("measurement '{raw}' has a non-numeric value"))?;
        if !value.is_finite() || value <= 0.0 {
            bail!("measurement '{raw}' must be positive");
        }
        Ok(Self {
            label: humanize_label(label),
            value,
            unit,
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.label, self.value, self.unit.as_str())
    }
}

pub fn format_measurements(measurements: &[Measurement]) -> String {
    measurements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<String>>()
        .join(", ")
}

fn humanize_label(raw: &str) -> String {
    raw.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units_and_labels() -> Result<()> {
        let chest = Measurement::parse("chest=102cm")?;
        assert_eq!(chest.label, "Chest");
        assert_eq!(chest.value, 102.0);
        assert_eq!(chest.unit, MeasurementUnit::Cm);

        let inseam = Measurement::parse("inner_leg = 32.5in")?;
        assert_eq!(inseam.label, "Inner Leg");
        assert_eq!(inseam.unit, MeasurementUnit::Inch);

        let bare = Measurement::parse("waist=84")?;
        assert_eq!(bare.unit, MeasurementUnit::Cm);
        Ok(())
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Measurement::parse("chest").is_err());
        assert!(Measurement::parse("=90cm").is_err());
        assert!(Measurement::parse("chest=wide").is_err());
        assert!(Measurement::parse("chest=-3cm").is_err());
    }

    #[test]
    fn formats_as_prompt_text() -> Result<()> {
        let text = format_measurements(&[
            Measurement::parse("chest=102cm")?,
            Measurement::parse("inseam=32in")?,
        ]);
        assert_eq!(text, "Chest: 102 cm, Inseam: 32 inch");
        Ok(())
    }
}
