//! Port specification parsing (`1-1000`, `22,80,443`, `22,8000-8010`)

use crate::ScanError;
use std::fmt;
use std::str::FromStr;

/// Ports requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// Inclusive range, `start <= end`
    Range { start: u16, end: u16 },
    /// Explicit ports in the order given, duplicates removed
    List(Vec<u16>),
}

impl PortSpec {
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(ScanError::PortRangeError("no ports given".to_string()));
        }

        if !spec.contains(',') {
            if let Some((start, end)) = parse_range(spec)? {
                return Ok(PortSpec::Range { start, end });
            }
        }

        let mut ports = Vec::new();
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ScanError::PortRangeError(format!(
                    "empty entry in port list '{}'",
                    spec
                )));
            }

            match parse_range(part)? {
                Some((start, end)) => ports.extend(start..=end),
                None => ports.push(parse_port(part)?),
            }
        }

        let mut seen = std::collections::HashSet::new();
        ports.retain(|port| seen.insert(*port));
        Ok(PortSpec::List(ports))
    }

    /// Every port this spec covers
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortSpec::Range { start, end } => (*start..=*end).collect(),
            PortSpec::List(ports) => ports.clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PortSpec::Range { start, end } => usize::from(*end - *start) + 1,
            PortSpec::List(ports) => ports.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromStr for PortSpec {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortSpec::parse(s)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Range { start, end } => write!(f, "{}-{}", start, end),
            PortSpec::List(ports) => {
                let ports: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", ports.join(","))
            }
        }
    }
}

/// `Some((start, end))` for `a-b`, `None` when `part` is a single port
fn parse_range(part: &str) -> crate::Result<Option<(u16, u16)>> {
    let (start, end) = match part.split_once('-') {
        Some(bounds) => bounds,
        None => return Ok(None),
    };

    let start = parse_port(start.trim())?;
    let end = parse_port(end.trim())?;
    if start > end {
        return Err(ScanError::PortRangeError(format!(
            "start port {} is greater than end port {}",
            start, end
        )));
    }

    Ok(Some((start, end)))
}

fn parse_port(value: &str) -> crate::Result<u16> {
    let port: u32 = value
        .parse()
        .map_err(|_| ScanError::PortRangeError(format!("invalid port '{}'", value)))?;

    if port == 0 || port > u32::from(u16::MAX) {
        return Err(ScanError::PortRangeError(format!(
            "port {} out of range 1-65535",
            port
        )));
    }

    Ok(port as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        let spec = PortSpec::parse("1-1000").unwrap();
        assert_eq!(spec, PortSpec::Range { start: 1, end: 1000 });
        assert_eq!(spec.len(), 1000);
        assert_eq!(spec.ports().first(), Some(&1));
        assert_eq!(spec.ports().last(), Some(&1000));
        assert_eq!(spec.to_string(), "1-1000");
    }

    #[test]
    fn test_parse_list() {
        let spec: PortSpec = "22, 80,443,80".parse().unwrap();
        assert_eq!(spec, PortSpec::List(vec![22, 80, 443]));
        assert_eq!(spec.to_string(), "22,80,443");
    }

    #[test]
    fn test_parse_mixed_list() {
        let spec = PortSpec::parse("22,8000-8002").unwrap();
        assert_eq!(spec.ports(), vec![22, 8000, 8001, 8002]);
    }

    #[test]
    fn test_single_port() {
        assert_eq!(PortSpec::parse("443").unwrap(), PortSpec::List(vec![443]));
        assert_eq!(
            PortSpec::parse("65535-65535").unwrap().ports(),
            vec![65535]
        );
    }

    #[test]
    fn test_full_range() {
        assert_eq!(PortSpec::parse("1-65535").unwrap().len(), 65535);
    }

    #[test]
    fn test_invalid_specs() {
        for spec in [
            "", "0", "65536", "100-1", "1-2-3", "http", "22,,80", "-80", "80-", "0-10",
        ] {
            let err = PortSpec::parse(spec).unwrap_err();
            assert!(err.is_input_error(), "{:?} should be rejected as input", spec);
        }
    }
}
