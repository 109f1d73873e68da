// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Subscription trie, the topic index of the broker.
//!
//! Filters are stored level by level; every node has literal children plus
//! two distinguished slots for `+` and `#`. Subscribers hang off the node
//! their filter ends at. A lookup for a published topic walks literal and
//! `+` branches in parallel and collects every `#` slot it passes.

use std::collections::HashMap;

use crate::message::Subscription;

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,

    /// The `+` branch, matching exactly one level.
    single: Option<Box<TrieNode>>,

    /// The `#` branch; its subscribers match all remaining levels,
    /// including none.
    multi: Option<Box<TrieNode>>,

    /// Subscribers whose filter ends at this node, by client id.
    subscribers: HashMap<String, Subscription>,
}

impl TrieNode {
    /// A node is prunable iff it has no children and no payload.
    fn is_prunable(&self) -> bool {
        self.children.is_empty()
            && self.single.is_none()
            && self.multi.is_none()
            && self.subscribers.is_empty()
    }

    fn collect<'a>(
        &'a self,
        levels: &[&str],
        acc: &mut Vec<(&'a str, &'a Subscription)>,
    ) {
        if let Some(multi) = &self.multi {
            for (client_id, subscription) in &multi.subscribers {
                acc.push((client_id, subscription));
            }
        }
        match levels.split_first() {
            None => {
                for (client_id, subscription) in &self.subscribers {
                    acc.push((client_id, subscription));
                }
            }
            Some((head, rest)) => {
                if let Some(child) = self.children.get(*head) {
                    child.collect(rest, acc);
                }
                if let Some(single) = &self.single {
                    single.collect(rest, acc);
                }
            }
        }
    }
}

/// The subscription index shared by every session of one broker node.
#[derive(Debug, Default)]
pub struct SubTrie {
    root: TrieNode,
    len: usize,
}

impl SubTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscriptions currently stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or replace the subscription of `client_id` for its filter.
    ///
    /// Returns true when the subscription did not exist before; replacing
    /// an existing one returns false.
    pub fn insert(&mut self, client_id: &str, subscription: Subscription) -> bool {
        let filter = subscription.filter.as_str().to_string();
        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = match level {
                "+" => node.single.get_or_insert_with(Box::default).as_mut(),
                "#" => node.multi.get_or_insert_with(Box::default).as_mut(),
                literal => node.children.entry(literal.to_string()).or_default(),
            };
        }
        let is_new = node
            .subscribers
            .insert(client_id.to_string(), subscription)
            .is_none();
        if is_new {
            self.len += 1;
        }
        is_new
    }

    /// Remove one subscription, pruning empty nodes along the path.
    ///
    /// Returns false if the client had no subscription for this filter.
    pub fn remove(&mut self, client_id: &str, filter: &str) -> bool {
        let levels: Vec<&str> = filter.split('/').collect();
        let removed = Self::remove_at(&mut self.root, client_id, &levels);
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn remove_at(node: &mut TrieNode, client_id: &str, levels: &[&str]) -> bool {
        let Some((head, rest)) = levels.split_first() else {
            return node.subscribers.remove(client_id).is_some();
        };
        match *head {
            "+" => {
                let Some(child) = node.single.as_mut() else {
                    return false;
                };
                let removed = Self::remove_at(child, client_id, rest);
                if child.is_prunable() {
                    node.single = None;
                }
                removed
            }
            "#" => {
                let Some(child) = node.multi.as_mut() else {
                    return false;
                };
                let removed = Self::remove_at(child, client_id, rest);
                if child.is_prunable() {
                    node.multi = None;
                }
                removed
            }
            literal => {
                let Some(child) = node.children.get_mut(literal) else {
                    return false;
                };
                let removed = Self::remove_at(child, client_id, rest);
                if child.is_prunable() {
                    node.children.remove(literal);
                }
                removed
            }
        }
    }

    /// Remove every subscription of one client, returning the filters
    /// that were dropped.
    pub fn remove_client(&mut self, client_id: &str) -> Vec<String> {
        let mut removed = Vec::new();
        Self::remove_client_at(&mut self.root, client_id, &mut removed);
        self.len -= removed.len();
        removed
    }

    fn remove_client_at(node: &mut TrieNode, client_id: &str, removed: &mut Vec<String>) {
        if let Some(subscription) = node.subscribers.remove(client_id) {
            removed.push(subscription.filter.as_str().to_string());
        }
        node.children.retain(|_, child| {
            Self::remove_client_at(child, client_id, removed);
            !child.is_prunable()
        });
        if let Some(child) = node.single.as_mut() {
            Self::remove_client_at(child, client_id, removed);
            if child.is_prunable() {
                node.single = None;
            }
        }
        if let Some(child) = node.multi.as_mut() {
            Self::remove_client_at(child, client_id, removed);
            if child.is_prunable() {
                node.multi = None;
            }
        }
    }

    /// All subscriptions whose filter matches the published topic.
    ///
    /// One client appears once per matching filter; overlap resolution
    /// happens in the router. Topics starting with `$` are only reachable
    /// through a literal first level [MQTT-4.7.2-1].
    #[must_use]
    pub fn matches(&self, topic: &str) -> Vec<(&str, &Subscription)> {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut acc = Vec::new();
        if topic.starts_with('$') {
            if let Some(child) = self.root.children.get(levels[0]) {
                child.collect(&levels[1..], &mut acc);
            }
        } else {
            self.root.collect(&levels, &mut acc);
        }
        acc
    }

    /// Every (client id, filter) pair currently in the index, used for the
    /// cluster snapshot.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Subscription)> {
        let mut acc = Vec::new();
        Self::entries_at(&self.root, &mut acc);
        acc
    }

    fn entries_at(node: &TrieNode, acc: &mut Vec<(String, Subscription)>) {
        for (client_id, subscription) in &node.subscribers {
            acc.push((client_id.clone(), subscription.clone()));
        }
        for child in node.children.values() {
            Self::entries_at(child, acc);
        }
        if let Some(child) = &node.single {
            Self::entries_at(child, acc);
        }
        if let Some(child) = &node.multi {
            Self::entries_at(child, acc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{QoS, TopicFilter};

    fn subscription(filter: &str, qos: QoS) -> Subscription {
        Subscription::new(TopicFilter::parse(filter).unwrap(), qos)
    }

    fn matched_clients(trie: &SubTrie, topic: &str) -> Vec<String> {
        let mut clients: Vec<String> = trie
            .matches(topic)
            .into_iter()
            .map(|(client_id, _)| client_id.to_string())
            .collect();
        clients.sort();
        clients
    }

    #[test]
    fn test_literal_and_wildcard_match() {
        let mut trie = SubTrie::new();
        trie.insert("a", subscription("home/kitchen/temp", QoS::AtMostOnce));
        trie.insert("b", subscription("home/+/temp", QoS::AtLeastOnce));
        trie.insert("c", subscription("home/#", QoS::ExactOnce));
        trie.insert("d", subscription("office/#", QoS::AtMostOnce));

        assert_eq!(
            matched_clients(&trie, "home/kitchen/temp"),
            vec!["a", "b", "c"]
        );
        assert_eq!(matched_clients(&trie, "home/hall/temp"), vec!["b", "c"]);
        assert_eq!(matched_clients(&trie, "home"), vec!["c"]);
        assert_eq!(matched_clients(&trie, "office/desk"), vec!["d"]);
    }

    #[test]
    fn test_one_client_multiple_filters() {
        let mut trie = SubTrie::new();
        trie.insert("s", subscription("a/+", QoS::AtLeastOnce));
        trie.insert("s", subscription("a/#", QoS::AtMostOnce));

        // Both filters match; the router deduplicates per client.
        assert_eq!(trie.matches("a/b").len(), 2);
        assert_eq!(trie.len(), 2);
    }

    #[test]
    fn test_resubscribe_replaces() {
        let mut trie = SubTrie::new();
        assert!(trie.insert("s", subscription("a/b", QoS::AtMostOnce)));
        assert!(!trie.insert("s", subscription("a/b", QoS::ExactOnce)));
        assert_eq!(trie.len(), 1);

        let matches = trie.matches("a/b");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.qos, QoS::ExactOnce);
    }

    #[test]
    fn test_sys_topics_need_literal_prefix() {
        let mut trie = SubTrie::new();
        trie.insert("w", subscription("#", QoS::AtMostOnce));
        trie.insert("p", subscription("+/broker/uptime", QoS::AtMostOnce));
        trie.insert("s", subscription("$SYS/#", QoS::AtMostOnce));

        assert_eq!(matched_clients(&trie, "$SYS/broker/uptime"), vec!["s"]);
        assert_eq!(matched_clients(&trie, "any/broker/uptime"), vec!["p", "w"]);
    }

    #[test]
    fn test_remove_prunes_empty_nodes() {
        let mut trie = SubTrie::new();
        trie.insert("a", subscription("x/y/z", QoS::AtMostOnce));
        trie.insert("b", subscription("x/+/z", QoS::AtMostOnce));

        assert!(trie.remove("a", "x/y/z"));
        assert!(!trie.remove("a", "x/y/z"));
        assert!(trie.remove("b", "x/+/z"));
        assert!(trie.is_empty());
        assert!(trie.root.is_prunable());
    }

    #[test]
    fn test_remove_client_drops_all_filters() {
        let mut trie = SubTrie::new();
        trie.insert("s", subscription("a/+", QoS::AtMostOnce));
        trie.insert("s", subscription("b/#", QoS::AtMostOnce));
        trie.insert("t", subscription("a/+", QoS::AtMostOnce));

        let mut removed = trie.remove_client("s");
        removed.sort();
        assert_eq!(removed, vec!["a/+", "b/#"]);
        assert_eq!(trie.len(), 1);
        assert_eq!(matched_clients(&trie, "a/x"), vec!["t"]);
    }

    #[test]
    fn test_multi_wildcard_matches_parent_level() {
        let mut trie = SubTrie::new();
        trie.insert("s", subscription("sport/tennis/player1/#", QoS::AtMostOnce));

        assert_eq!(matched_clients(&trie, "sport/tennis/player1"), vec!["s"]);
        assert_eq!(
            matched_clients(&trie, "sport/tennis/player1/ranking"),
            vec!["s"]
        );
        assert!(matched_clients(&trie, "sport/tennis/player2").is_empty());
    }
}
