//! Collision handlers keyed by collision type tags, and notifications of moved bodies.

use super::{BodyKey, Contact};
use crate::math as m;

use std::borrow::Cow;

/// A tag attached to a body to select which collision handlers apply to it.
///
/// Tags only affect event dispatch, never the physical response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde-types", serde(transparent))]
pub struct CollisionType(Cow<'static, str>);

impl CollisionType {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for CollisionType {
    fn from(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }
}

impl From<String> for CollisionType {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl std::fmt::Display for CollisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One side of the pair of tags a collision handler applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagPattern {
    /// Matches bodies with exactly this tag.
    Exact(CollisionType),
    /// Matches any body, including untagged ones.
    Any,
}

impl TagPattern {
    /// How specifically this pattern matches a tag, or `None` if it doesn't.
    fn specificity(&self, tag: Option<&CollisionType>) -> Option<u8> {
        match (self, tag) {
            (TagPattern::Any, _) => Some(1),
            (TagPattern::Exact(t), Some(tag)) if t == tag => Some(2),
            _ => None,
        }
    }
}

impl From<CollisionType> for TagPattern {
    fn from(tag: CollisionType) -> Self {
        TagPattern::Exact(tag)
    }
}

impl From<&'static str> for TagPattern {
    fn from(tag: &'static str) -> Self {
        TagPattern::Exact(tag.into())
    }
}

/// Deferred changes to the world requested by a collision handler.
///
/// Applied right after the handler returns, before the next handler runs.
#[derive(Debug, Default)]
pub struct Commands {
    removals: Vec<BodyKey>,
}

impl Commands {
    /// Remove a body and its shapes from the world.
    /// Requests to remove a body that's already gone are ignored.
    pub fn remove_body(&mut self, body: BodyKey) {
        self.removals.push(body);
    }

    pub(crate) fn drain_removals(&mut self) -> impl '_ + Iterator<Item = BodyKey> {
        self.removals.drain(..)
    }
}

type ContactCallback = Box<dyn FnMut(&Contact, &mut Commands)>;
type ContactFilter = Box<dyn FnMut(&Contact) -> bool>;

/// Reacts to contacts between bodies whose collision types match a pair of patterns.
///
/// The contact given to the callbacks is oriented so that `bodies[0]`
/// is the body matching the first pattern.
///
/// ```
/// use stepframe::{CollisionHandler, TagPattern};
///
/// let handler = CollisionHandler::new("bullet", TagPattern::Any)
///     .on_contact(|contact, commands| commands.remove_body(contact.bodies[0]));
/// ```
pub struct CollisionHandler {
    patterns: [TagPattern; 2],
    on_contact: Option<ContactCallback>,
    filter: Option<ContactFilter>,
}

impl CollisionHandler {
    pub fn new(first: impl Into<TagPattern>, second: impl Into<TagPattern>) -> Self {
        Self {
            patterns: [first.into(), second.into()],
            on_contact: None,
            filter: None,
        }
    }

    /// Set the function called after solving for each contact this handler applies to.
    pub fn on_contact(mut self, callback: impl FnMut(&Contact, &mut Commands) + 'static) -> Self {
        self.on_contact = Some(Box::new(callback));
        self
    }

    /// Set a function called before solving that decides whether a contact happens at all.
    /// Rejected contacts get no physical response and aren't passed to `on_contact`.
    /// Useful for one-way platforms.
    pub fn with_filter(mut self, filter: impl FnMut(&Contact) -> bool + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    fn score(&self, tags: [Option<&CollisionType>; 2]) -> Option<u8> {
        Some(self.patterns[0].specificity(tags[0])? + self.patterns[1].specificity(tags[1])?)
    }
}

impl std::fmt::Debug for CollisionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollisionHandler")
            .field("patterns", &self.patterns)
            .field("on_contact", &self.on_contact.is_some())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// The handler chosen for a contact and whether the contact needs flipping to match it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Resolved {
    pub index: usize,
    pub swapped: bool,
}

impl Resolved {
    pub fn orient(&self, contact: &Contact) -> Contact {
        if self.swapped {
            contact.flipped()
        } else {
            *contact
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct HandlerSet(Vec<CollisionHandler>);

impl HandlerSet {
    pub fn push(&mut self, handler: CollisionHandler) {
        self.0.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pick the most specific handler for a pair of tags.
    /// An exact pair beats one wildcard which beats two.
    /// Ties go to the earliest registered handler, unswapped before swapped.
    pub fn resolve(&self, tags: [Option<&CollisionType>; 2]) -> Option<Resolved> {
        let mut best: Option<(u8, Resolved)> = None;
        for (index, handler) in self.0.iter().enumerate() {
            let candidates = [
                (handler.score(tags), false),
                (handler.score([tags[1], tags[0]]), true),
            ];
            for (score, swapped) in candidates {
                let Some(score) = score else { continue };
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, Resolved { index, swapped }));
                }
            }
        }
        best.map(|(_, resolved)| resolved)
    }

    /// Run the handler's filter on a contact. Contacts without a filter are accepted.
    pub fn accepts(&mut self, resolved: Resolved, contact: &Contact) -> bool {
        match &mut self.0[resolved.index].filter {
            Some(filter) => filter(&resolved.orient(contact)),
            None => true,
        }
    }

    pub fn invoke(&mut self, resolved: Resolved, contact: &Contact, commands: &mut Commands) {
        if let Some(callback) = &mut self.0[resolved.index].on_contact {
            callback(&resolved.orient(contact), commands);
        }
    }
}

/// Notification that a body's transform changed during a step,
/// e.g. for moving the sprite that represents it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovedEvent {
    pub body: BodyKey,
    pub position: m::Vec2,
    /// Rotation in radians, counterclockwise.
    pub rotation: f64,
}

pub(crate) type MovedListener = Box<dyn FnMut(&MovedEvent)>;

#[cfg(test)]
mod tests {
    use super::*;

    fn tags<'a>(
        a: Option<&'a CollisionType>,
        b: Option<&'a CollisionType>,
    ) -> [Option<&'a CollisionType>; 2] {
        [a, b]
    }

    #[test]
    fn most_specific_handler_wins() {
        let player = CollisionType::from("player");
        let coin = CollisionType::from("coin");
        let mut set = HandlerSet::default();
        set.push(CollisionHandler::new(TagPattern::Any, TagPattern::Any));
        set.push(CollisionHandler::new("player", TagPattern::Any));
        set.push(CollisionHandler::new("player", "coin"));
        set.push(CollisionHandler::new("coin", "player"));

        let exact = set.resolve(tags(Some(&player), Some(&coin)));
        assert_eq!(exact, Some(Resolved { index: 2, swapped: false }));
        // both exact handlers match; the earlier one wins, flipped to fit
        let exact = set.resolve(tags(Some(&coin), Some(&player)));
        assert_eq!(exact, Some(Resolved { index: 2, swapped: true }));

        let one_wild = set.resolve(tags(None, Some(&player)));
        assert_eq!(one_wild, Some(Resolved { index: 1, swapped: true }));

        let two_wild = set.resolve(tags(None, None));
        assert_eq!(two_wild, Some(Resolved { index: 0, swapped: false }));
    }

    #[test]
    fn untagged_bodies_only_match_wildcards() {
        let mut set = HandlerSet::default();
        set.push(CollisionHandler::new("bullet", "wall"));
        let wall = CollisionType::from("wall");
        assert_eq!(set.resolve(tags(None, Some(&wall))), None);
        assert_eq!(set.resolve(tags(None, None)), None);
    }

    #[test]
    fn tags_compare_by_name() {
        assert_eq!(CollisionType::from("a"), CollisionType::from(String::from("a")));
        assert_eq!(CollisionType::new("enemy").to_string(), "enemy");
    }
}
