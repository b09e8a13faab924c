//! OBIS codes and DLMS unit symbols.

use std::borrow::Cow;

/// OBIS code of the meter identification register in SML lists.
pub const SML_METER_ID: &str = "1-0:0.0.9";

/// OBIS code (reduced form) of the identification register in plain-text responses.
pub const PLAIN_METER_ID: &str = "9.21";

/// Formats a 6-byte OBIS code as `A-B:C.D.E*F`.
#[must_use]
pub fn format(code: &[u8]) -> Option<String> {
    match code {
        [a, b, c, d, e, f] => Some(format!("{a}-{b}:{c}.{d}.{e}*{f}")),
        _ => None,
    }
}

/// Symbol of a DLMS/COSEM unit code (IEC 62056-62).
#[must_use]
pub const fn unit_symbol(code: u8) -> Option<&'static str> {
    Some(match code {
        1 => "a",
        2 => "mo",
        3 => "wk",
        4 => "d",
        5 => "h",
        6 => "min",
        7 => "s",
        8 => "°",
        9 => "°C",
        10 => "currency",
        11 => "m",
        12 => "m/s",
        13 | 14 => "m³",
        15 | 16 => "m³/h",
        17 | 18 => "m³/d",
        19 => "l",
        20 => "kg",
        21 => "N",
        22 => "Nm",
        23 => "Pa",
        24 => "bar",
        25 => "J",
        26 => "J/h",
        27 => "W",
        28 => "VA",
        29 => "var",
        30 => "Wh",
        31 => "VAh",
        32 => "varh",
        33 => "A",
        34 => "C",
        35 => "V",
        36 => "V/m",
        37 => "F",
        38 => "Ω",
        39 => "Ωm²/m",
        40 => "Wb",
        41 => "T",
        42 => "A/m",
        43 => "H",
        44 => "Hz",
        45 => "1/(Wh)",
        46 => "1/(varh)",
        47 => "1/(VAh)",
        48 => "V²h",
        49 => "A²h",
        50 => "kg/s",
        51 => "S",
        52 => "K",
        53 => "1/(V²h)",
        54 => "1/(A²h)",
        55 => "1/m³",
        56 => "%",
        57 => "Ah",
        60 => "Wh/m³",
        61 => "J/m³",
        62 => "Mol %",
        63 => "g/m³",
        64 => "Pa s",
        65 => "J/kg",
        70 => "dBm",
        71 => "dBµV",
        72 => "dB",
        255 => "count",
        _ => return None,
    })
}

/// Unit symbol, or the numeric code for units without one.
#[must_use]
pub fn unit_name(code: u8) -> Cow<'static, str> {
    unit_symbol(code).map_or_else(|| Cow::Owned(code.to_string()), Cow::Borrowed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_obis() {
        assert_eq!(format(&[1, 0, 1, 8, 0, 255]).as_deref(), Some("1-0:1.8.0*255"));
        assert_eq!(
            format(&[0x81, 0x81, 0xc7, 0x82, 0x03, 0xff]).as_deref(),
            Some("129-129:199.130.3*255")
        );
        assert_eq!(format(&[1, 0, 1]), None);
    }

    #[test]
    fn test_units() {
        assert_eq!(unit_name(30), "Wh");
        assert_eq!(unit_name(27), "W");
        assert_eq!(unit_name(200), "200");
    }
}
