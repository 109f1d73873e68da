// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The ACL app, deciding whether a client may publish or subscribe.

use std::collections::HashMap;
use tokio::sync::mpsc::{Receiver, Sender};

use codec::TopicFilter;

use crate::commands::{AclToListenerCmd, ListenerToAclCmd};
use crate::config::{AclAccess, AclRule, Security};
use crate::error::{Error, ErrorKind};
use crate::types::ListenerId;

/// Direction of the checked action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDirection {
    Publish,
    Subscribe,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    filter: TopicFilter,
    client_id: Option<String>,
    access: AclAccess,
    allow: bool,
}

impl CompiledRule {
    fn covers(&self, client_id: &str, direction: AclDirection) -> bool {
        if let Some(rule_client) = &self.client_id {
            if rule_client != client_id {
                return false;
            }
        }
        match (self.access, direction) {
            (AclAccess::All, _)
            | (AclAccess::Publish, AclDirection::Publish)
            | (AclAccess::Subscribe, AclDirection::Subscribe) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct AclApp {
    rules: Vec<CompiledRule>,

    listener_senders: HashMap<ListenerId, Sender<AclToListenerCmd>>,
    listener_receiver: Receiver<ListenerToAclCmd>,
}

impl AclApp {
    /// Compile the configured rule list.
    ///
    /// # Errors
    ///
    /// Returns error if a rule filter is invalid.
    pub fn new(
        security: &Security,
        listener_senders: Vec<(ListenerId, Sender<AclToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToAclCmd>,
    ) -> Result<Self, Error> {
        let rules = security
            .acl_rules()
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(Self {
            rules,
            listener_senders: listener_senders.into_iter().collect(),
            listener_receiver,
        })
    }

    pub async fn run_loop(&mut self) -> ! {
        loop {
            if let Some(cmd) = self.listener_receiver.recv().await {
                if let Err(err) = self.handle_listener_cmd(cmd).await {
                    log::error!("acl: Failed to handle listener cmd: {err:?}");
                }
            }
        }
    }

    async fn handle_listener_cmd(&mut self, cmd: ListenerToAclCmd) -> Result<(), Error> {
        match cmd {
            ListenerToAclCmd::CheckPublish {
                gid,
                client_id,
                topic,
                packet_id,
                qos,
            } => {
                let allowed = self.may_act(&client_id, topic.as_str(), AclDirection::Publish);
                self.send_response(
                    gid.listener_id(),
                    AclToListenerCmd::PublishResult {
                        gid,
                        packet_id,
                        qos,
                        allowed,
                    },
                )
                .await
            }
            ListenerToAclCmd::CheckSubscribe {
                gid,
                client_id,
                packet_id,
                subscriptions,
            } => {
                let entries = subscriptions
                    .into_iter()
                    .map(|subscription| {
                        let allowed = self.may_act(
                            &client_id,
                            subscription.filter.as_str(),
                            AclDirection::Subscribe,
                        );
                        (subscription, allowed)
                    })
                    .collect();
                self.send_response(
                    gid.listener_id(),
                    AclToListenerCmd::SubscribeResult {
                        gid,
                        packet_id,
                        entries,
                    },
                )
                .await
            }
        }
    }

    /// The action predicate: first matching rule wins, no rule allows.
    ///
    /// Subscribe checks compare the rule filter against the requested
    /// filter string, so a rule on `home/#` covers a subscription to
    /// `home/#` itself as well as any concrete topic below it.
    fn may_act(&self, client_id: &str, topic: &str, direction: AclDirection) -> bool {
        for rule in &self.rules {
            if !rule.covers(client_id, direction) {
                continue;
            }
            if rule.filter.as_str() == topic || rule.filter.matches(topic) {
                return rule.allow;
            }
        }
        true
    }

    async fn send_response(
        &mut self,
        listener_id: ListenerId,
        cmd: AclToListenerCmd,
    ) -> Result<(), Error> {
        if let Some(listener_sender) = self.listener_senders.get(&listener_id) {
            listener_sender.send(cmd).await.map_err(Into::into)
        } else {
            Err(Error::from_string(
                ErrorKind::ChannelError,
                format!("acl: No listener sender with id {listener_id}"),
            ))
        }
    }
}

fn compile_rule(rule: &AclRule) -> Result<CompiledRule, Error> {
    let filter = TopicFilter::parse(&rule.filter).map_err(|err| {
        Error::from_string(
            ErrorKind::ConfigError,
            format!("acl: Invalid filter {:?}: {err}", rule.filter),
        )
    })?;
    Ok(CompiledRule {
        filter,
        client_id: rule.client_id.clone(),
        access: rule.access,
        allow: rule.allow,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn new_app(rules: Vec<AclRule>) -> AclApp {
        let security = Security::with_acl_rules(rules);
        let (_tx, rx) = mpsc::channel(1);
        AclApp::new(&security, Vec::new(), rx).unwrap()
    }

    #[test]
    fn test_default_allows_everything() {
        let app = new_app(Vec::new());
        assert!(app.may_act("c1", "any/topic", AclDirection::Publish));
    }

    #[test]
    fn test_first_match_wins() {
        let app = new_app(vec![
            AclRule {
                filter: "secret/#".to_string(),
                client_id: None,
                access: AclAccess::Subscribe,
                allow: false,
            },
            AclRule {
                filter: "#".to_string(),
                client_id: None,
                access: AclAccess::All,
                allow: true,
            },
        ]);
        assert!(!app.may_act("c1", "secret/plans", AclDirection::Subscribe));
        assert!(app.may_act("c1", "secret/plans", AclDirection::Publish));
        assert!(app.may_act("c1", "public/news", AclDirection::Subscribe));
    }

    #[test]
    fn test_client_scoped_rule() {
        let app = new_app(vec![AclRule {
            filter: "devices/+/cmd".to_string(),
            client_id: Some("intruder".to_string()),
            access: AclAccess::Publish,
            allow: false,
        }]);
        assert!(!app.may_act("intruder", "devices/d1/cmd", AclDirection::Publish));
        assert!(app.may_act("operator", "devices/d1/cmd", AclDirection::Publish));
    }
}
