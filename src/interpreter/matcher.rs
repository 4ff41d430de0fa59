use crate::model::Channel;

/// Nearest guild channel to `name`, compensating for typos and partial
/// names.
///
/// The score is the Levenshtein distance between `name` and each candidate
/// truncated to `name`'s character length, so a prefix like "gen" sits at
/// distance 0 from "general" while "gaming" stays at 2. A candidate is
/// accepted when twice its distance does not exceed the query length; ties
/// go to the first candidate in enumeration order.
pub fn closest_channel<'a>(name: &str, channels: &'a [Channel]) -> Option<&'a Channel> {
    let query_len = name.chars().count();

    let mut best: Option<(usize, &Channel)> = None;
    for channel in channels {
        let prefix: String = channel.name.chars().take(query_len).collect();
        let distance = strsim::levenshtein(name, &prefix);

        if distance * 2 > query_len {
            continue;
        }

        if best.map_or(true, |(seen, _)| distance < seen) {
            best = Some((distance, channel));
        }
    }

    best.map(|(_, channel)| channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::ChannelId;

    fn channels(names: &[&str]) -> Vec<Channel> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Channel::new(ChannelId::new(format!("id-{i}")), name.to_string(), true))
            .collect()
    }

    #[test]
    fn partial_name_picks_the_closer_channel() {
        let channels = channels(&["general", "gaming"]);
        let best = closest_channel("gen", &channels).unwrap();
        assert_eq!(best.name, "general");
    }

    #[test]
    fn typo_within_budget_still_matches() {
        let channels = channels(&["general", "gaming"]);
        let best = closest_channel("generel", &channels).unwrap();
        assert_eq!(best.name, "general");
    }

    #[test]
    fn exact_match_wins() {
        let channels = channels(&["gaming", "general"]);
        let best = closest_channel("general", &channels).unwrap();
        assert_eq!(best.name, "general");
    }

    #[test]
    fn ties_go_to_enumeration_order() {
        let channels = channels(&["ab-first", "ab-second"]);
        let best = closest_channel("ab", &channels).unwrap();
        assert_eq!(best.name, "ab-first");
    }

    #[test]
    fn nothing_close_enough_is_no_match() {
        let channels = channels(&["general", "gaming"]);
        assert!(closest_channel("xyz", &channels).is_none());
    }

    #[test]
    fn empty_guild_has_no_match() {
        assert!(closest_channel("general", &[]).is_none());
    }
}
