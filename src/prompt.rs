use crate::message::Message;

/// Keys the model is asked to fill for each trade.
pub const TRADE_KEYS: [&str; 7] = ["ticker", "direction", "type", "expiry", "strike", "size", "price"];

/// Fixed preamble. `{k}` is replaced with the batch length.
const INSTRUCTION: &str = "Task:\n\
- Each numbered message below is one line from a broker chat.\n\
- For every message, extract the option or stock trade it describes, if any.\n\
- Use only what is written in the message. Do not guess missing values.\n\
Return exactly ONE JSON array with exactly {k} elements, in the same order as the messages.\n\
Element i describes Message i: either an object with any of the keys {keys}, or null when the message holds no trade.\n\
Do not number, wrap or explain the array.";

/// Build the single prompt for one batch. Messages are numbered from 1 within
/// the batch; the reply's element order is expected to follow that numbering.
pub fn build_prompt(batch: &[Message], use_clean_text: bool) -> String {
    let instruction = INSTRUCTION
        .replace("{k}", &batch.len().to_string())
        .replace("{keys}", &TRADE_KEYS.join(", "));

    let numbered: Vec<String> = batch
        .iter()
        .enumerate()
        .map(|(i, msg)| format!("Message {}: {}", i + 1, msg.text(use_clean_text)))
        .collect();

    format!("{}\n\n{}", instruction, numbered.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_messages_from_one_and_states_length() {
        let batch = vec![
            Message::new("09:30:01", "raw one").with_clean_text("one"),
            Message::new("09:30:02", "two"),
        ];
        let prompt = build_prompt(&batch, true);
        assert!(prompt.contains("exactly 2 elements"));
        assert!(prompt.ends_with("Message 1: one\nMessage 2: two"));
        assert!(prompt.contains("ticker, direction, type, expiry, strike, size, price"));
    }

    #[test]
    fn raw_text_used_when_clean_disabled() {
        let batch = vec![Message::new("t", "RAW").with_clean_text("clean")];
        assert!(build_prompt(&batch, false).ends_with("Message 1: RAW"));
    }
}
