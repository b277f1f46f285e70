use std::fmt::Display;

/// A concrete topic a message is published to. Wildcard characters carry no
/// meaning here; the broker treats the name as an opaque `/`-separated path.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Hash)]
pub struct TopicName(String);

impl TopicName {
    pub fn new(name: impl Into<String>) -> Self {
        return Self(name.into());
    }

    pub fn as_str(&self) -> &str {
        return &self.0;
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    pub fn segments(&self) -> std::str::Split<'_, char> {
        return self.0.split('/');
    }
}

impl Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.0);
    }
}

/// A subscription filter. `+` matches exactly one segment, a trailing `#`
/// matches the parent topic and everything below it. A `#` anywhere else is
/// an ordinary literal segment.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct TopicFilter {
    raw: String,
    segments: Vec<FilterSegment>,
}

#[derive(PartialEq, Eq, Clone, Debug)]
enum FilterSegment {
    Literal(String),
    SingleLevel,
    MultiLevel,
}

impl TopicFilter {
    pub fn from_str(filter: &str) -> Self {
        let count = filter.split('/').count();
        let segments = filter
            .split('/')
            .enumerate()
            .map(|(idx, seg)| match seg {
                "+" => FilterSegment::SingleLevel,
                "#" if idx == count - 1 => FilterSegment::MultiLevel,
                _ => FilterSegment::Literal(String::from(seg)),
            })
            .collect();

        return Self {
            raw: String::from(filter),
            segments,
        };
    }

    pub fn as_str(&self) -> &str {
        return &self.raw;
    }

    pub fn len(&self) -> usize {
        return self.raw.len();
    }

    pub fn matches(&self, topic: &TopicName) -> bool {
        let topic_segments: Vec<&str> = topic.segments().collect();

        if let Some(FilterSegment::MultiLevel) = self.segments.last() {
            let prefix = &self.segments[..self.segments.len() - 1];
            // "a/#" matches "a" itself as well as anything below it.
            if topic_segments.len() < prefix.len() {
                return false;
            }
            return prefix
                .iter()
                .zip(topic_segments.iter())
                .all(|(filter_segment, topic_segment)| {
                    filter_segment.matches(topic_segment)
                });
        }

        if topic_segments.len() != self.segments.len() {
            return false;
        }

        return self
            .segments
            .iter()
            .zip(topic_segments.iter())
            .all(|(filter_segment, topic_segment)| filter_segment.matches(topic_segment));
    }
}

impl FilterSegment {
    fn matches(&self, topic_segment: &str) -> bool {
        match self {
            Self::SingleLevel => return true,
            Self::MultiLevel => return true,
            Self::Literal(literal) => return literal == topic_segment,
        }
    }
}

impl Display for TopicFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.raw);
    }
}

#[cfg(test)]
mod matching {
    use super::{TopicFilter, TopicName};

    fn matches(topic: &str, filter: &str) -> bool {
        return TopicFilter::from_str(filter).matches(&TopicName::new(topic));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("sport/tennis/player1", "sport/tennis/player1/#"));
        assert!(matches("sport/tennis/player1/ranking", "sport/tennis/player1/#"));
        assert!(matches("sport/tennis/player1/score/wimbledon", "sport/#"));

        // the multi-level wildcard also includes the parent topic
        assert!(matches("a", "a/#"));
        assert!(!matches("b", "a/#"));
        assert!(!matches("a/b", "a/b/c"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("a/b", "a/+"));
        assert!(matches("sport/tennis/player1", "sport/+/player1"));
        assert!(!matches("sport/tennis/player1/ranking", "sport/tennis/+"));

        // "+" spans exactly one segment, including an empty one
        assert!(matches("sport/", "sport/+"));
        assert!(!matches("sport", "sport/+"));
        assert!(matches("/finance", "+/+"));
        assert!(!matches("/finance", "+"));
    }

    #[test]
    fn root_wildcard_matches_everything() {
        assert!(matches("a", "#"));
        assert!(matches("a/b/c", "#"));
        // no $SYS carve-out: reserved-looking prefixes are plain topics here
        assert!(matches("$SYS/monitor", "#"));
    }

    #[test]
    fn exact_topics_match_themselves() {
        for topic in ["test", "a/b/c", "sensors/room1/temp"] {
            assert!(matches(topic, topic));
        }
        assert!(!matches("a/b", "a/c"));
    }

    #[test]
    fn hash_off_the_tail_is_a_literal() {
        assert!(matches("a/#/b", "a/#/b"));
        assert!(!matches("a/x/b", "a/#/b"));
    }
}
