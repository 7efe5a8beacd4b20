use crate::render::RenderedCard;

/// Shows cards whose machine identifier or visible text contains `keyword`,
/// ignoring case, and hides the rest. A blank keyword shows every card.
pub fn filter(cards: &mut [RenderedCard], keyword: &str) {
    let kw = keyword.trim().to_lowercase();
    for card in cards.iter_mut() {
        card.visible = kw.is_empty()
            || card.machine_no.to_lowercase().contains(&kw)
            || card.text.to_lowercase().contains(&kw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    fn card(machine_no: &str, text: &str) -> RenderedCard {
        RenderedCard {
            machine_no: machine_no.to_string(),
            status: Status::Ready,
            text: format!("{machine_no} {text}"),
            markup: String::new(),
            visible: true,
        }
    }

    fn visible(cards: &[RenderedCard]) -> Vec<&str> {
        cards
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.machine_no.as_str())
            .collect()
    }

    #[test]
    fn matches_machine_case_insensitively() {
        let mut cards = vec![card("MC-01", "PN-001"), card("MC-02", "PN-002")];
        filter(&mut cards, "mc-01");
        assert_eq!(visible(&cards), vec!["MC-01"]);
    }

    #[test]
    fn matches_card_text() {
        let mut cards = vec![card("MC-01", "A.Best"), card("MC-02", "Siam Parts")];
        filter(&mut cards, "  SIAM ");
        assert_eq!(visible(&cards), vec!["MC-02"]);
    }

    #[test]
    fn blank_keyword_shows_everything_again() {
        let mut cards = vec![card("MC-01", ""), card("MC-02", "")];
        filter(&mut cards, "zzz");
        assert!(visible(&cards).is_empty());
        filter(&mut cards, "   ");
        assert_eq!(visible(&cards), vec!["MC-01", "MC-02"]);
    }
}
