use super::avro::{AvroReader, AvroWriter};
use super::schema::VOTE_SCHEMA_NAME;
use crate::domain::VoteEvent;
use crate::foundation::util::time::parse_rfc3339;
use crate::foundation::{SkusError, VoteId};

pub fn encode_vote_event(event: &VoteEvent) -> Vec<u8> {
    let mut w = AvroWriter::new();
    w.string(&event.id.to_string())
        .string(event.vote_type.as_str())
        .string(&event.channel)
        .string(&event.created_at_rfc3339())
        .string(&event.base_vote_value)
        .long(event.vote_tally)
        .string(event.funding_source.as_str());
    w.finish()
}

pub fn decode_vote_event(bytes: &[u8]) -> Result<VoteEvent, SkusError> {
    let mut r = AvroReader::new(VOTE_SCHEMA_NAME, bytes);
    let id: VoteId = r.string()?.parse()?;
    let vote_type = r.string()?.parse()?;
    let channel = r.string()?;
    let created_at = parse_rfc3339(&r.string()?)?;
    let base_vote_value = r.string()?;
    let vote_tally = r.long()?;
    let funding_source = r.string()?.parse()?;
    r.finish()?;
    Ok(VoteEvent { id, vote_type, channel, created_at, base_vote_value, vote_tally, funding_source })
}
