//! DNS message helpers on top of `hickory-proto`.

use hickory_proto::error::ProtoResult;
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::RecordType;

/// Length of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// The first question of an inbound query.
#[derive(Debug, Clone)]
pub struct Question {
    /// Name as received in ASCII form (punycode labels stay encoded),
    /// including the trailing root label.
    pub name: String,
    pub qtype: RecordType,
}

impl Question {
    pub fn from_message(message: &Message) -> Option<Self> {
        let query = message.queries().first()?;
        Some(Self {
            name: query.name().to_ascii(),
            qtype: query.query_type(),
        })
    }

    pub fn is_a(&self) -> bool {
        self.qtype == RecordType::A
    }
}

/// Start a reply to `request`: same id, opcode, question and RD flag, with
/// NOERROR and no records.
pub fn reply_to(request: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_checking_disabled(request.checking_disabled())
        .set_response_code(ResponseCode::NoError);
    if let Some(query) = request.queries().first() {
        reply.add_query(query.clone());
    }
    reply
}

/// A reply to `request` carrying only a response code.
pub fn error_reply(request: &Message, code: ResponseCode) -> Message {
    let mut reply = reply_to(request);
    reply.set_response_code(code);
    reply
}

/// FORMERR reply for a packet that could not be parsed. Only the id is
/// recovered from the raw bytes.
pub fn format_error(raw: &[u8]) -> Option<Vec<u8>> {
    if raw.len() < 2 {
        return None;
    }
    let mut reply = Message::new();
    reply
        .set_id(u16::from_be_bytes([raw[0], raw[1]]))
        .set_message_type(MessageType::Response)
        .set_response_code(ResponseCode::FormErr);
    reply.to_vec().ok()
}

pub fn encode(message: &Message) -> ProtoResult<Vec<u8>> {
    message.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::Query;
    use hickory_proto::rr::Name;

    fn query(name: &str, qtype: RecordType) -> Message {
        let mut msg = Message::new();
        msg.set_id(0x1234)
            .set_message_type(MessageType::Query)
            .set_recursion_desired(true);
        msg.add_query(Query::query(Name::from_ascii(name).unwrap(), qtype));
        msg
    }

    #[test]
    fn question_keeps_name_as_received() {
        let q = Question::from_message(&query("Foo.Example.com.", RecordType::AAAA)).unwrap();
        assert_eq!(q.name, "Foo.Example.com.");
        assert_eq!(q.qtype, RecordType::AAAA);
        assert!(!q.is_a());
    }

    #[test]
    fn punycode_labels_stay_encoded() {
        let q = Question::from_message(&query("xn--bcher-kva.Example.com.", RecordType::A)).unwrap();
        assert_eq!(q.name, "xn--bcher-kva.Example.com.");
        assert!(q.is_a());
    }

    #[test]
    fn reply_mirrors_request() {
        let request = query("example.com.", RecordType::A);
        let reply = reply_to(&request);
        assert_eq!(reply.id(), 0x1234);
        assert_eq!(reply.message_type(), MessageType::Response);
        assert!(reply.recursion_desired());
        assert_eq!(reply.queries(), request.queries());
        assert_eq!(reply.response_code(), ResponseCode::NoError);
    }

    #[test]
    fn format_error_recovers_id() {
        let bytes = format_error(&[0xAB, 0xCD, 0xFF]).unwrap();
        let reply = Message::from_vec(&bytes).unwrap();
        assert_eq!(reply.id(), 0xABCD);
        assert_eq!(reply.response_code(), ResponseCode::FormErr);
        assert!(format_error(&[0x01]).is_none());
    }
}
