use tessera_core::{DocumentChunk, SensitivityLabel};

pub fn sensitivity_rank(value: &str) -> u8 {
    SensitivityLabel::parse(value).rank()
}

/// Highest-ranked label among the chunks that carry one.
///
/// Ties keep the first label seen; unlabelled chunks do not contribute.
pub fn max_sensitivity(chunks: &[DocumentChunk]) -> Option<SensitivityLabel> {
    let mut best: Option<&SensitivityLabel> = None;
    for label in chunks.iter().filter_map(|c| c.pii_sensitivity.as_ref()) {
        if best.map_or(true, |current| label.rank() > current.rank()) {
            best = Some(label);
        }
    }
    best.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::PiiLevel;

    fn chunk(id: &str, label: Option<&str>) -> DocumentChunk {
        let chunk = DocumentChunk::new(id, "text", "doc");
        match label {
            Some(label) => chunk.with_sensitivity(SensitivityLabel::parse(label)),
            None => chunk,
        }
    }

    #[test]
    fn takes_the_maximum_rank() {
        let chunks = vec![
            chunk("1", Some("none")),
            chunk("2", Some("high")),
            chunk("3", Some("medium")),
        ];
        assert_eq!(
            max_sensitivity(&chunks),
            Some(SensitivityLabel::Known(PiiLevel::High))
        );
    }

    #[test]
    fn unrecognized_ranks_like_medium_and_ties_keep_first() {
        let chunks = vec![
            chunk("1", Some("none")),
            chunk("2", Some("restricted")),
            chunk("3", Some("medium")),
        ];
        let label = max_sensitivity(&chunks).unwrap();
        assert_eq!(label.as_str(), "restricted");
        assert_eq!(sensitivity_rank("restricted"), sensitivity_rank("medium"));
    }

    #[test]
    fn unlabelled_chunks_report_nothing() {
        assert_eq!(max_sensitivity(&[]), None);
        assert_eq!(max_sensitivity(&[chunk("1", None)]), None);
    }
}
