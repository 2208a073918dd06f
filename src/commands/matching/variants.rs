use crate::util::title_case;

const NAME_SUFFIXES: &[&str] = &[" JR.", " SR.", " JR", " SR", " III", " II", " IV"];

const OCR_DIGIT_SUBSTITUTIONS: &[(char, &[char])] = &[
    ('0', &['8', '6']),
    ('1', &['7']),
    ('2', &['7']),
    ('5', &['3']),
    ('8', &['0', '3']),
    ('9', &['4', '7']),
];

/// Alternative spellings of a surname, in the order they are tried.
/// The input itself is never part of the result.
pub fn name_variations(surname: &str) -> Vec<String> {
    let name = surname.trim();
    let mut variations = Variations::new(name);
    if name.is_empty() {
        return variations.finish();
    }

    variations.push(name.to_uppercase());
    variations.push(name.to_lowercase());
    variations.push(title_case(name));

    if name.contains(' ') {
        variations.push(name.replace(' ', ""));
        variations.push(name.replace(' ', "-"));
    }

    let upper = name.to_uppercase();
    for suffix in NAME_SUFFIXES {
        if let Some(base) = upper.strip_suffix(suffix) {
            let base = base.trim_end();
            variations.push(base.to_string());
            variations.push(title_case(base));
        }
    }

    let parts: Vec<&str> = name.split_whitespace().collect();
    if parts.len() == 2 && parts[1].chars().count() <= 2 {
        variations.push(parts[0].to_string());
        variations.push(parts.concat());
    }

    let lower = name.to_lowercase();
    if let Some(rest) = lower.strip_prefix("mc").filter(|rest| !rest.is_empty()) {
        variations.push(format!("Mc{}", title_case(rest)));
        variations.push(format!("Mac{}", title_case(rest)));
    }
    if let Some(rest) = lower
        .strip_prefix('o')
        .filter(|rest| !rest.is_empty() && !rest.starts_with('\''))
    {
        variations.push(format!("O'{}", title_case(rest)));
    }

    if name.contains('-') {
        variations.push(name.replace('-', ""));
        variations.push(name.replace('-', " "));
        if let Some(first) = name.split('-').next() {
            variations.push(first.to_string());
        }
    }

    variations.finish()
}

/// Single-digit OCR corrections of a last-four value, first `limit` only.
pub fn ssn_corrections(last_4: &str, limit: usize) -> Vec<String> {
    let digits: Vec<char> = last_4.chars().collect();
    let mut corrections = Vec::new();
    if limit == 0 {
        return corrections;
    }

    for (index, digit) in digits.iter().enumerate() {
        let Some((_, replacements)) = OCR_DIGIT_SUBSTITUTIONS
            .iter()
            .find(|(candidate, _)| candidate == digit)
        else {
            continue;
        };
        for replacement in *replacements {
            let mut corrected = digits.clone();
            corrected[index] = *replacement;
            let corrected: String = corrected.into_iter().collect();
            if corrected != last_4 && !corrections.contains(&corrected) {
                corrections.push(corrected);
            }
            if corrections.len() >= limit {
                return corrections;
            }
        }
    }

    corrections
}

/// Insertion-ordered, de-duplicated list that excludes the original name.
struct Variations<'a> {
    original: &'a str,
    values: Vec<String>,
}

impl<'a> Variations<'a> {
    fn new(original: &'a str) -> Self {
        Self {
            original,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() || value == self.original || self.values.contains(&value) {
            return;
        }
        self.values.push(value);
    }

    fn finish(self) -> Vec<String> {
        self.values
    }
}
