// Small text helpers shared by the validator and the mapper.

/// Keep only ASCII digits.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Fold Latin-1 accented letters to their unaccented ASCII base.
///
/// Government spreadsheets mix "ÁLCOOL" and "ALCOOL", "MUNICÍPIO" and
/// "MUNICIPIO" freely, so every comparison on names goes through this.
pub fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ç' => 'C',
            'ç' => 'c',
            'Ñ' => 'N',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

/// Uppercase, trim and collapse internal runs of whitespace to one space.
pub fn upper_squash(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Comparison form for header labels: accent-folded, uppercased, squashed.
pub fn header_key(s: &str) -> String {
    upper_squash(&fold_accents(s))
}

/// Trimmed value, or `None` when blank.
pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
