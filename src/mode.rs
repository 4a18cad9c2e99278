//! Channel mode-string interpretation.
//!
//! Walks a mode specification such as `+o-v alice bob` left to right,
//! producing one granular event per recognized letter and updating op and
//! voice prefixes in the channel registry as it goes. The aggregate
//! `Mode` event with the raw string closes the sequence.

use crate::channels::{ChannelRegistry, StatusChange};
use crate::event::Event;
use crate::source::Source;

/// Interpret a channel mode change.
///
/// `mode` is the raw mode text after the channel target, e.g.
/// `"+o-v alice bob"`. Registry prefixes for `o`/`v` recipients are
/// updated in place; the returned events are in left-to-right order with
/// the aggregate event last.
pub(crate) fn process_channel_mode(
    registry: &ChannelRegistry,
    channel: &str,
    source: &Source,
    mode: &str,
) -> Vec<Event> {
    let params: Vec<&str> = mode.split_whitespace().collect();
    let mut events = Vec::new();

    if let Some(spec) = params.first() {
        let mut plus = false;
        let mut p = 1usize;

        for c in spec.chars() {
            let channel = channel.to_owned();
            let source = source.clone();
            match c {
                '+' => plus = true,
                '-' => plus = false,
                'o' => {
                    if let Some(&nick) = params.get(p) {
                        if plus {
                            registry.update_user(&channel, StatusChange::GrantOp, nick);
                            events.push(Event::Op {
                                channel,
                                source,
                                recipient: nick.to_owned(),
                            });
                        } else {
                            registry.update_user(&channel, StatusChange::RevokeOp, nick);
                            events.push(Event::Deop {
                                channel,
                                source,
                                recipient: nick.to_owned(),
                            });
                        }
                    }
                    p += 1;
                }
                'v' => {
                    if let Some(&nick) = params.get(p) {
                        if plus {
                            registry.update_user(&channel, StatusChange::GrantVoice, nick);
                            events.push(Event::Voice {
                                channel,
                                source,
                                recipient: nick.to_owned(),
                            });
                        } else {
                            registry.update_user(&channel, StatusChange::RevokeVoice, nick);
                            events.push(Event::DeVoice {
                                channel,
                                source,
                                recipient: nick.to_owned(),
                            });
                        }
                    }
                    p += 1;
                }
                'k' => {
                    if let Some(&key) = params.get(p) {
                        events.push(if plus {
                            Event::SetChannelKey {
                                channel,
                                source,
                                key: key.to_owned(),
                            }
                        } else {
                            Event::RemoveChannelKey {
                                channel,
                                source,
                                key: key.to_owned(),
                            }
                        });
                    }
                    p += 1;
                }
                'l' => {
                    if plus {
                        if let Some(limit) = params.get(p).and_then(|s| s.parse::<u32>().ok()) {
                            events.push(Event::SetChannelLimit {
                                channel,
                                source,
                                limit,
                            });
                        }
                        p += 1;
                    } else {
                        events.push(Event::RemoveChannelLimit { channel, source });
                    }
                }
                'b' => {
                    if let Some(&hostmask) = params.get(p) {
                        events.push(if plus {
                            Event::SetChannelBan {
                                channel,
                                source,
                                hostmask: hostmask.to_owned(),
                            }
                        } else {
                            Event::RemoveChannelBan {
                                channel,
                                source,
                                hostmask: hostmask.to_owned(),
                            }
                        });
                    }
                    p += 1;
                }
                't' => {
                    events.push(if plus {
                        Event::SetTopicProtection { channel, source }
                    } else {
                        Event::RemoveTopicProtection { channel, source }
                    });
                }
                'n' => {
                    events.push(if plus {
                        Event::SetNoExternalMessages { channel, source }
                    } else {
                        Event::RemoveNoExternalMessages { channel, source }
                    });
                }
                'i' => {
                    events.push(if plus {
                        Event::SetInviteOnly { channel, source }
                    } else {
                        Event::RemoveInviteOnly { channel, source }
                    });
                }
                'm' => {
                    events.push(if plus {
                        Event::SetModerated { channel, source }
                    } else {
                        Event::RemoveModerated { channel, source }
                    });
                }
                'p' => {
                    events.push(if plus {
                        Event::SetPrivate { channel, source }
                    } else {
                        Event::RemovePrivate { channel, source }
                    });
                }
                's' => {
                    events.push(if plus {
                        Event::SetSecret { channel, source }
                    } else {
                        Event::RemoveSecret { channel, source }
                    });
                }
                _ => {}
            }
        }
    }

    events.push(Event::Mode {
        channel: channel.to_owned(),
        source: source.clone(),
        mode: mode.to_owned(),
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelUser;

    fn op_source() -> Source {
        Source::parse(":op!o@h")
    }

    #[test]
    fn test_op_then_devoice_in_one_spec() {
        let registry = ChannelRegistry::new();
        registry.add_user("#c", ChannelUser::new("", "bob"));

        let events = process_channel_mode(&registry, "#c", &op_source(), "+o-v bob bob");

        assert!(matches!(&events[0], Event::Op { recipient, .. } if recipient == "bob"));
        assert!(matches!(&events[1], Event::DeVoice { recipient, .. } if recipient == "bob"));
        assert!(matches!(&events[2], Event::Mode { mode, .. } if mode == "+o-v bob bob"));
        assert_eq!(events.len(), 3);

        let users = registry.users("#c");
        assert_eq!(users[0].prefix(), "@");
    }

    #[test]
    fn test_voice_preserved_across_op_changes() {
        let registry = ChannelRegistry::new();
        registry.add_user("#c", ChannelUser::new("+", "bob"));

        process_channel_mode(&registry, "#c", &op_source(), "+o bob");
        assert_eq!(registry.users("#c")[0].prefix(), "@+");

        process_channel_mode(&registry, "#c", &op_source(), "-o bob");
        assert_eq!(registry.users("#c")[0].prefix(), "+");
    }

    #[test]
    fn test_key_and_limit_argument_consumption() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "+kl secret 25");

        assert!(matches!(&events[0], Event::SetChannelKey { key, .. } if key == "secret"));
        assert!(matches!(&events[1], Event::SetChannelLimit { limit, .. } if *limit == 25));
    }

    #[test]
    fn test_limit_removal_takes_no_argument() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "-l+b *!*@bad.host");

        assert!(matches!(&events[0], Event::RemoveChannelLimit { .. }));
        assert!(
            matches!(&events[1], Event::SetChannelBan { hostmask, .. } if hostmask == "*!*@bad.host")
        );
    }

    #[test]
    fn test_flag_modes() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "+tnims-ps");

        assert!(matches!(&events[0], Event::SetTopicProtection { .. }));
        assert!(matches!(&events[1], Event::SetNoExternalMessages { .. }));
        assert!(matches!(&events[2], Event::SetInviteOnly { .. }));
        assert!(matches!(&events[3], Event::SetModerated { .. }));
        assert!(matches!(&events[4], Event::SetSecret { .. }));
        assert!(matches!(&events[5], Event::RemovePrivate { .. }));
        assert!(matches!(&events[6], Event::RemoveSecret { .. }));
        assert!(matches!(&events[7], Event::Mode { .. }));
    }

    #[test]
    fn test_unrecognized_letters_skipped() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "+xz");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Mode { .. }));
    }

    #[test]
    fn test_missing_argument_emits_nothing_for_that_letter() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "+oo onlyone");
        assert!(matches!(&events[0], Event::Op { recipient, .. } if recipient == "onlyone"));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_empty_mode_string_still_yields_aggregate() {
        let registry = ChannelRegistry::new();
        let events = process_channel_mode(&registry, "#c", &op_source(), "");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Mode { mode, .. } if mode.is_empty()));
    }
}
