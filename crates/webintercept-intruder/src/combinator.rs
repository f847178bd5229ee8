//! Payload combinators
//!
//! Positions are byte ranges tagged with the field they index into. A
//! combination assigns one payload per position; the four modes differ only
//! in which assignments they enumerate. Combinations are generated lazily so
//! a cluster bomb over large sets never materialises its cartesian product.

use std::collections::HashMap;
use webintercept_core::model::{Attack, AttackMode, Position, PositionField};
use webintercept_core::{Error, Result};

/// A request with all positions substituted
#[derive(Debug, Clone)]
pub struct AppliedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Validate positions and payload sets before an attack may run
pub fn validate(attack: &Attack) -> Result<()> {
    if attack.positions.is_empty() {
        return Err(Error::invalid_config("attack has no payload positions"));
    }
    if attack.payload_sets.is_empty() || attack.payload_sets.iter().any(Vec::is_empty) {
        return Err(Error::invalid_config("attack has an empty payload set"));
    }

    match attack.mode {
        AttackMode::Pitchfork | AttackMode::ClusterBomb => {
            if attack.payload_sets.len() != attack.positions.len() {
                return Err(Error::invalid_config(format!(
                    "{} positions but {} payload sets",
                    attack.positions.len(),
                    attack.payload_sets.len()
                )));
            }
        }
        AttackMode::Sniper | AttackMode::BatteringRam => {}
    }

    // Bounds per field, overlap within a field.
    let mut by_field: HashMap<&PositionField, Vec<&Position>> = HashMap::new();
    for position in &attack.positions {
        if position.start > position.end {
            return Err(Error::invalid_config(format!(
                "position range {}..{} is inverted",
                position.start, position.end
            )));
        }
        let template = field_template(attack, &position.field).ok_or_else(|| {
            Error::invalid_config(format!("position references missing field {:?}", position.field))
        })?;
        if position.end > template.len() {
            return Err(Error::invalid_config(format!(
                "position end {} exceeds field length {}",
                position.end,
                template.len()
            )));
        }
        if !template.is_char_boundary(position.start) || !template.is_char_boundary(position.end) {
            return Err(Error::invalid_config(format!(
                "position {}..{} splits a multi-byte character",
                position.start, position.end
            )));
        }
        by_field.entry(&position.field).or_default().push(position);
    }
    for positions in by_field.values_mut() {
        positions.sort_by_key(|p| p.start);
        for pair in positions.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(Error::invalid_config(format!(
                    "overlapping positions {}..{} and {}..{}",
                    pair[0].start, pair[0].end, pair[1].start, pair[1].end
                )));
            }
        }
    }
    Ok(())
}

/// Total request count for the mode and payload sets
pub fn total_requests(mode: AttackMode, num_positions: usize, payload_counts: &[usize]) -> u64 {
    if num_positions == 0 || payload_counts.is_empty() || payload_counts.contains(&0) {
        return 0;
    }
    match mode {
        AttackMode::Sniper => (0..num_positions)
            .map(|i| payload_counts[i.min(payload_counts.len() - 1)] as u64)
            .sum(),
        AttackMode::BatteringRam => payload_counts[0] as u64,
        AttackMode::Pitchfork => *payload_counts.iter().min().unwrap_or(&0) as u64,
        AttackMode::ClusterBomb => payload_counts.iter().map(|&c| c as u64).product(),
    }
}

/// Lazy combination stream: each item is one payload vector, index-aligned
/// with the attack's positions.
pub struct Combinations {
    mode: AttackMode,
    num_positions: usize,
    payload_sets: Vec<Vec<String>>,
    cursor: Cursor,
}

enum Cursor {
    /// (position index, payload index)
    Sniper { position: usize, payload: usize },
    /// payload index into the first set
    Linear { index: usize },
    /// odometer over the sets, position-index order, rightmost fastest
    Odometer { digits: Vec<usize>, done: bool },
}

impl Combinations {
    /// Build the stream for an attack's mode, positions, and payload sets
    pub fn new(attack: &Attack) -> Self {
        let cursor = match attack.mode {
            AttackMode::Sniper => Cursor::Sniper {
                position: 0,
                payload: 0,
            },
            AttackMode::BatteringRam | AttackMode::Pitchfork => Cursor::Linear { index: 0 },
            AttackMode::ClusterBomb => Cursor::Odometer {
                digits: vec![0; attack.positions.len()],
                done: attack.payload_sets.iter().any(Vec::is_empty),
            },
        };
        Self {
            mode: attack.mode,
            num_positions: attack.positions.len(),
            payload_sets: attack.payload_sets.clone(),
            cursor,
        }
    }

}

impl Iterator for Combinations {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let num_positions = self.num_positions;
        match &mut self.cursor {
            Cursor::Sniper { position, payload } => {
                while *position < num_positions {
                    // Positions beyond the last set draw from the last set.
                    let set = &self.payload_sets[(*position).min(self.payload_sets.len() - 1)];
                    if *payload < set.len() {
                        let mut combo = vec![String::new(); num_positions];
                        combo[*position] = set[*payload].clone();
                        *payload += 1;
                        return Some(combo);
                    }
                    *position += 1;
                    *payload = 0;
                }
                None
            }
            Cursor::Linear { index } => match self.mode {
                AttackMode::BatteringRam => {
                    let set = &self.payload_sets[0];
                    if *index >= set.len() {
                        return None;
                    }
                    let combo = vec![set[*index].clone(); self.num_positions];
                    *index += 1;
                    Some(combo)
                }
                AttackMode::Pitchfork => {
                    let shortest = self.payload_sets.iter().map(Vec::len).min().unwrap_or(0);
                    if *index >= shortest {
                        return None;
                    }
                    let combo: Vec<String> =
                        self.payload_sets.iter().map(|set| set[*index].clone()).collect();
                    *index += 1;
                    Some(combo)
                }
                _ => None,
            },
            Cursor::Odometer { digits, done } => {
                if *done {
                    return None;
                }
                let combo: Vec<String> = digits
                    .iter()
                    .enumerate()
                    .map(|(i, &d)| self.payload_sets[i][d].clone())
                    .collect();
                // Increment rightmost-fastest so output follows
                // position-index order.
                let mut carry = true;
                for i in (0..digits.len()).rev() {
                    if !carry {
                        break;
                    }
                    digits[i] += 1;
                    if digits[i] < self.payload_sets[i].len() {
                        carry = false;
                    } else {
                        digits[i] = 0;
                    }
                }
                if carry {
                    *done = true;
                }
                Some(combo)
            }
        }
    }
}

/// Substitute one combination into the attack's templates.
///
/// Positions are applied from highest start offset to lowest within each
/// field, keeping earlier offsets valid as the text length changes.
pub fn apply_combination(attack: &Attack, payloads: &[String]) -> AppliedRequest {
    let url = substitute_field(attack, &PositionField::Url, payloads);
    let headers = attack
        .header_templates
        .iter()
        .map(|(name, _)| {
            let field = PositionField::Header(name.clone());
            (name.clone(), substitute_field(attack, &field, payloads))
        })
        .collect();
    let body = attack
        .body_template
        .as_ref()
        .map(|_| substitute_field(attack, &PositionField::Body, payloads));

    AppliedRequest { url, headers, body }
}

fn field_template<'a>(attack: &'a Attack, field: &PositionField) -> Option<&'a str> {
    match field {
        PositionField::Url => Some(&attack.url_template),
        PositionField::Body => attack.body_template.as_deref(),
        PositionField::Header(name) => attack
            .header_templates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str()),
    }
}

fn substitute_field(attack: &Attack, field: &PositionField, payloads: &[String]) -> String {
    let Some(template) = field_template(attack, field) else {
        return String::new();
    };
    let mut positions: Vec<(usize, &Position)> = attack
        .positions
        .iter()
        .enumerate()
        .filter(|(_, p)| &p.field == field)
        .collect();
    positions.sort_by(|a, b| b.1.start.cmp(&a.1.start));

    let mut result = template.to_string();
    for (index, position) in positions {
        if let Some(payload) = payloads.get(index) {
            result.replace_range(position.start..position.end, payload);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use webintercept_core::model::Position;

    fn attack(mode: AttackMode, sets: Vec<Vec<&str>>) -> Attack {
        // Template: http://t.test/?a=A&b=B with positions over A and B.
        let mut attack = Attack::new("t", mode, "GET", "http://t.test/?a=A&b=B");
        attack.positions = vec![Position::url(17, 18), Position::url(21, 22)];
        attack.payload_sets = sets
            .into_iter()
            .map(|s| s.into_iter().map(String::from).collect())
            .collect();
        attack
    }

    fn collect(attack: &Attack) -> Vec<Vec<String>> {
        Combinations::new(attack).collect()
    }

    #[test]
    fn sniper_tests_one_position_at_a_time() {
        let a = attack(AttackMode::Sniper, vec![vec!["x", "y"]]);
        let combos = collect(&a);
        assert_eq!(
            combos,
            vec![
                vec!["x".to_string(), String::new()],
                vec!["y".to_string(), String::new()],
                vec![String::new(), "x".to_string()],
                vec![String::new(), "y".to_string()],
            ]
        );
        assert_eq!(total_requests(AttackMode::Sniper, 2, &[2]) as usize, combos.len());
    }

    #[test]
    fn battering_ram_repeats_one_payload_everywhere() {
        let a = attack(AttackMode::BatteringRam, vec![vec!["x", "y"]]);
        let combos = collect(&a);
        assert_eq!(
            combos,
            vec![
                vec!["x".to_string(), "x".to_string()],
                vec!["y".to_string(), "y".to_string()],
            ]
        );
        assert_eq!(total_requests(AttackMode::BatteringRam, 2, &[2]), 2);
    }

    #[test]
    fn pitchfork_truncates_to_shortest_set() {
        let a = attack(AttackMode::Pitchfork, vec![vec!["x", "y", "z"], vec!["1", "2"]]);
        let combos = collect(&a);
        assert_eq!(
            combos,
            vec![
                vec!["x".to_string(), "1".to_string()],
                vec!["y".to_string(), "2".to_string()],
            ]
        );
        assert_eq!(total_requests(AttackMode::Pitchfork, 2, &[3, 2]), 2);
    }

    #[test]
    fn cluster_bomb_is_cartesian_in_position_order() {
        let a = attack(AttackMode::ClusterBomb, vec![vec!["a", "b"], vec!["1", "2", "3"]]);
        let combos = collect(&a);
        let expected: Vec<Vec<String>> = [
            ["a", "1"], ["a", "2"], ["a", "3"],
            ["b", "1"], ["b", "2"], ["b", "3"],
        ]
        .iter()
        .map(|pair| pair.iter().map(|s| s.to_string()).collect())
        .collect();
        assert_eq!(combos, expected);
        assert_eq!(total_requests(AttackMode::ClusterBomb, 2, &[2, 3]), 6);
    }

    #[test]
    fn substitution_applies_highest_offset_first() {
        let a = attack(AttackMode::Pitchfork, vec![vec!["longer-value"], vec!["v2"]]);
        let applied =
            apply_combination(&a, &["longer-value".to_string(), "v2".to_string()]);
        assert_eq!(applied.url, "http://t.test/?a=longer-value&b=v2");
    }

    #[test]
    fn positions_span_url_headers_and_body() {
        let mut a = Attack::new("multi", AttackMode::Pitchfork, "POST", "http://t.test/?q=Q");
        a.header_templates = vec![("X-Api-Key".to_string(), "KEY".to_string())];
        a.body_template = Some("user=U".to_string());
        a.positions = vec![
            Position::url(17, 18),
            Position::header("X-Api-Key", 0, 3),
            Position::body(5, 6),
        ];
        a.payload_sets = vec![
            vec!["q1".to_string()],
            vec!["secret".to_string()],
            vec!["alice".to_string()],
        ];

        let applied = apply_combination(
            &a,
            &["q1".to_string(), "secret".to_string(), "alice".to_string()],
        );
        assert_eq!(applied.url, "http://t.test/?q=q1");
        assert_eq!(applied.headers, vec![("X-Api-Key".to_string(), "secret".to_string())]);
        assert_eq!(applied.body.as_deref(), Some("user=alice"));
    }

    #[test]
    fn overlapping_positions_fail_validation() {
        let mut a = attack(AttackMode::Sniper, vec![vec!["x"]]);
        a.positions = vec![Position::url(17, 20), Position::url(19, 22)];
        let err = validate(&a).unwrap_err();
        assert!(err.to_string().contains("overlapping"));
    }

    #[test]
    fn out_of_bounds_position_fails_validation() {
        let mut a = attack(AttackMode::Sniper, vec![vec!["x"]]);
        a.positions = vec![Position::url(0, 9999)];
        assert!(validate(&a).is_err());
    }

    #[test]
    fn set_count_mismatch_fails_for_parallel_modes() {
        let a = attack(AttackMode::ClusterBomb, vec![vec!["x"]]);
        assert!(validate(&a).is_err());

        let a = attack(AttackMode::Pitchfork, vec![vec!["x"]]);
        assert!(validate(&a).is_err());

        // Sniper clamps instead.
        let a = attack(AttackMode::Sniper, vec![vec!["x"]]);
        assert!(validate(&a).is_ok());
    }
}
