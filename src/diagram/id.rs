/// 60 symbols: digits, upper case, lower case without `e` and `x`, with `_` standing in for `o`.
/// `e` and `x`/`o` would let generated ids spell `end` or read as edge endings.
const ALPHABET: &[u8; 60] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdfghijklmn_pqrstuvwyz";

/// Words the diagram grammar reserves. A generated id equal to one of these is skipped.
pub const RESERVED_IDS: &[&str] = &[
    "end", "graph", "subgraph", "flowchart", "style", "class", "classDef", "click", "call",
    "href", "linkStyle", "direction", "default", "TB", "TD", "BT", "RL", "LR",
];

/// Base-60 positional encoding of `index` over [`ALPHABET`], most significant symbol first.
pub fn encode_index(index: usize) -> String {
    if index == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut symbols = Vec::new();
    let mut remaining = index;
    while remaining > 0 {
        symbols.push(ALPHABET[remaining % ALPHABET.len()]);
        remaining /= ALPHABET.len();
    }
    symbols.iter().rev().map(|&b| b as char).collect()
}

pub fn is_reserved(id: &str) -> bool {
    RESERVED_IDS.contains(&id)
}

/// Hands out compact vertex ids in arena order, never yielding a reserved word.
#[derive(Debug, Default)]
pub struct CompactIds {
    next: usize,
}

impl Iterator for CompactIds {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let id = encode_index(self.next);
            self.next += 1;
            if !is_reserved(&id) {
                return Some(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn alphabet_has_sixty_distinct_symbols() {
        let set: HashSet<u8> = ALPHABET.iter().copied().collect();
        assert_eq!(set.len(), 60);
        assert!(!set.contains(&b'e'));
        assert!(!set.contains(&b'x'));
        assert!(!set.contains(&b'o'));
    }

    #[test]
    fn encodes_positionally() {
        assert_eq!(encode_index(0), "0");
        assert_eq!(encode_index(9), "9");
        assert_eq!(encode_index(10), "A");
        assert_eq!(encode_index(59), "z");
        assert_eq!(encode_index(60), "10");
        assert_eq!(encode_index(61), "11");
    }

    #[test]
    fn reserved_words_are_skipped() {
        // "TD" is 29 * 60 + 13.
        assert_eq!(encode_index(29 * 60 + 13), "TD");
        let ids: Vec<String> = CompactIds::default().take(29 * 60 + 20).collect();
        assert!(!ids.iter().any(|id| id == "TD"));
        assert!(ids.iter().any(|id| id == "TE"));
    }

    #[test]
    fn generated_ids_are_unique_and_never_reserved() {
        let mut seen = HashSet::new();
        for id in CompactIds::default().take(250_000) {
            assert!(!is_reserved(&id), "reserved id generated: {id}");
            assert!(seen.insert(id), "duplicate id generated");
        }
    }
}
