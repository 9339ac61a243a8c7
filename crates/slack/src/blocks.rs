use serde::Serialize;

use proptalk_core::pagination::PropertyBatch;

pub const SHOW_MORE_ACTION: &str = "show_more";
pub const PROPERTY_DETAILS_ACTION: &str = "property_details";

/// Slack caps an actions block at 25 elements; one slot is kept for "Show more".
const MAX_DETAIL_BUTTONS: usize = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::PlainText { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "button")]
pub struct ButtonElement {
    pub action_id: String,
    pub text: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ButtonElement {
    pub fn new(action_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { action_id: action_id.into(), text: TextObject::plain(label), style: None, value: None }
    }

    pub fn primary(mut self) -> Self {
        self.style = Some(ButtonStyle::Primary);
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Divider { block_id: String },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Context { block_id: String, elements: Vec<TextObject> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn action_ids(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Actions { elements, .. } => Some(elements),
                _ => None,
            })
            .flatten()
            .map(|button| button.action_id.as_str())
            .collect()
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section(mut self, block_id: impl Into<String>, text: TextObject) -> Self {
        self.blocks.push(Block::Section { block_id: block_id.into(), text });
        self
    }

    pub fn divider(mut self, block_id: impl Into<String>) -> Self {
        self.blocks.push(Block::Divider { block_id: block_id.into() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        if !builder.elements.is_empty() {
            self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.elements });
        }
        self
    }

    pub fn context(mut self, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.blocks.push(Block::Context {
            block_id: block_id.into(),
            elements: vec![TextObject::mrkdwn(text)],
        });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }
}

/// Renders a runtime reply. The reply text already numbers the batch, so the
/// blocks add a position footer and buttons that replay as ordinary turns.
pub fn reply_message(text: &str, batch: Option<&PropertyBatch>) -> MessageTemplate {
    let builder = MessageBuilder::new(text).section("reply", TextObject::mrkdwn(text));
    let Some(batch) = batch.filter(|batch| !batch.properties.is_empty()) else {
        return builder.build();
    };

    let last_position = batch.first_position + batch.properties.len() - 1;
    builder
        .divider("batch_divider")
        .actions("batch_actions", |actions| {
            for (index, property) in batch.properties.iter().take(MAX_DETAIL_BUTTONS).enumerate() {
                let ordinal = index + 1;
                actions.button(
                    ButtonElement::new(PROPERTY_DETAILS_ACTION, format!("Details #{ordinal}"))
                        .value(format!("{ordinal}|{}", property.id)),
                );
            }
            if batch.remaining > 0 {
                actions.button(ButtonElement::new(SHOW_MORE_ACTION, "Show more").primary());
            }
        })
        .context(
            "batch_position",
            format!("Showing {}-{last_position} of {}", batch.first_position, batch.total),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use proptalk_core::domain::property::{Property, PropertyId};
    use proptalk_core::domain::requirements::{PropertyType, TransactionType};
    use proptalk_core::pagination::PropertyBatch;

    use super::{reply_message, Block, PROPERTY_DETAILS_ACTION, SHOW_MORE_ACTION};

    fn listing(id: &str) -> Property {
        Property {
            id: PropertyId(id.to_string()),
            transaction_type: TransactionType::Rent,
            location: "Dubai Marina".to_string(),
            property_type: PropertyType::Apartment,
            bedrooms: 2,
            price: 90_000,
            building_name: None,
            size_sqft: None,
        }
    }

    #[test]
    fn plain_reply_is_a_single_section() {
        let message = reply_message("Which area do you have in mind?", None);
        assert_eq!(message.fallback_text, "Which area do you have in mind?");
        assert_eq!(message.blocks.len(), 1);
        assert!(message.action_ids().is_empty());
    }

    #[test]
    fn batch_reply_offers_details_and_show_more() {
        let batch = PropertyBatch {
            properties: vec![listing("P-11"), listing("P-12"), listing("P-13")],
            first_position: 11,
            total: 47,
            remaining: 34,
        };
        let message = reply_message("11-13 of 47", Some(&batch));

        let actions = message.action_ids();
        assert_eq!(actions.iter().filter(|id| **id == PROPERTY_DETAILS_ACTION).count(), 3);
        assert_eq!(actions.last(), Some(&SHOW_MORE_ACTION));
        assert!(message.blocks.iter().any(|block| matches!(
            block,
            Block::Context { elements, .. } if elements[0].text() == "Showing 11-13 of 47"
        )));
    }

    #[test]
    fn final_batch_has_no_show_more_button() {
        let batch = PropertyBatch {
            properties: vec![listing("P-21"), listing("P-22")],
            first_position: 21,
            total: 22,
            remaining: 0,
        };
        let message = reply_message("last two", Some(&batch));
        assert!(!message.action_ids().contains(&SHOW_MORE_ACTION));
    }

    #[test]
    fn serialises_to_block_kit_shape() {
        let batch = PropertyBatch {
            properties: vec![listing("P-1")],
            first_position: 1,
            total: 5,
            remaining: 4,
        };
        let json = serde_json::to_value(reply_message("hello", Some(&batch))).expect("json");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["blocks"][0]["type"], "section");
        assert_eq!(json["blocks"][0]["text"]["type"], "mrkdwn");
        assert_eq!(json["blocks"][2]["elements"][0]["type"], "button");
        assert_eq!(json["blocks"][2]["elements"][0]["value"], "1|P-1");
        assert_eq!(json["blocks"][2]["elements"][1]["style"], "primary");
    }
}
