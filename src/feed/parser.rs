use quick_xml::events::{BytesText, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors produced while decoding a fetched feed body.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not a well-formed syndication document
    #[error("Malformed feed: {0}")]
    Malformed(String),
}

/// A decoded feed: channel metadata plus items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDocument {
    pub title: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

/// One entry of a feed. `pub_date` is the raw string from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Parse a feed body into a [`FeedDocument`].
///
/// RSS 2.0 is read directly so `pubDate` survives as the raw string. Atom,
/// RSS 1.0 and JSON Feed bodies go through `feed-rs`, with dates rendered as
/// RFC 3339. Text fields are HTML-unescaped in both paths.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    if looks_like_json(bytes) {
        return parse_with_feed_rs(bytes);
    }
    match root_element(bytes)?.as_slice() {
        b"rss" => parse_rss(bytes),
        _ => parse_with_feed_rs(bytes),
    }
}

fn looks_like_json(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Name of the first element in the document.
fn root_element(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => return Ok(e.name().as_ref().to_vec()),
            Ok(Event::Eof) => return Err(ParseError::Malformed("no root element".into())),
            Ok(_) => {}
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
        }
        buf.clear();
    }
}

/// Which text field the reader is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

fn field_for(path: &[Vec<u8>]) -> Option<Field> {
    match path {
        [rss, channel, leaf] if rss == b"rss" && channel == b"channel" => match leaf.as_slice() {
            b"title" => Some(Field::ChannelTitle),
            b"description" => Some(Field::ChannelDescription),
            _ => None,
        },
        [rss, channel, item, leaf]
            if rss == b"rss" && channel == b"channel" && item == b"item" =>
        {
            match leaf.as_slice() {
                b"title" => Some(Field::ItemTitle),
                b"link" => Some(Field::ItemLink),
                b"description" => Some(Field::ItemDescription),
                b"pubDate" => Some(Field::ItemPubDate),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_rss(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    // quick-xml never expands <!ENTITY> declarations, so a hostile DOCTYPE
    // cannot pull in external content.
    // Text events are not trimmed individually: a field split by CDATA or a
    // comment keeps its inner spacing, and only the finished field is trimmed.
    let mut reader = Reader::from_reader(bytes);

    let mut document = FeedDocument::default();
    let mut item: Option<FeedItem> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut saw_channel = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(e.name().as_ref().to_vec());
                match path.as_slice() {
                    [_, channel] if channel == b"channel" => saw_channel = true,
                    [_, channel, name] if channel == b"channel" && name == b"item" => {
                        item = Some(FeedItem::default());
                    }
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                if let [_, channel, name] = path.as_slice() {
                    if channel == b"channel" && name == b"item" {
                        if let Some(finished) = item.take() {
                            document.items.push(finish_item(finished));
                        }
                    }
                }
                path.pop();
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = field_for(&path) {
                    let text = text_content(&reader, &e);
                    append(&mut document, item.as_mut(), field, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(field) = field_for(&path) {
                    let text = String::from_utf8_lossy(e.as_ref());
                    append(&mut document, item.as_mut(), field, &text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseError::Malformed(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(ParseError::Malformed("unexpected end of document".into()));
    }
    if !saw_channel {
        return Err(ParseError::Malformed("RSS document has no <channel>".into()));
    }

    document.title = unescape_html(document.title.trim());
    document.description = unescape_html(document.description.trim());
    Ok(document)
}

/// XML-unescape a text node. Feeds often use HTML entities such as `&nbsp;`
/// that XML does not define; those are left for the HTML pass.
fn text_content<R>(reader: &Reader<R>, text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => reader
            .decoder()
            .decode(text.as_ref())
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(text.as_ref()).into_owned()),
    }
}

fn append(document: &mut FeedDocument, item: Option<&mut FeedItem>, field: Field, text: &str) {
    let target = match (field, item) {
        (Field::ChannelTitle, _) => &mut document.title,
        (Field::ChannelDescription, _) => &mut document.description,
        (Field::ItemTitle, Some(item)) => &mut item.title,
        (Field::ItemLink, Some(item)) => &mut item.link,
        (Field::ItemDescription, Some(item)) => &mut item.description,
        (Field::ItemPubDate, Some(item)) => &mut item.pub_date,
        (_, None) => return,
    };
    target.push_str(text);
}

fn finish_item(item: FeedItem) -> FeedItem {
    FeedItem {
        title: unescape_html(item.title.trim()),
        link: item.link.trim().to_string(),
        description: unescape_html(item.description.trim()),
        pub_date: item.pub_date.trim().to_string(),
    }
}

/// Decode HTML entities left in text after XML unescaping (`&amp;amp;` → `&`).
fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn parse_with_feed_rs(bytes: &[u8]) -> Result<FeedDocument, ParseError> {
    let feed =
        feed_rs::parser::parse(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let pub_date = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default();
            FeedItem {
                title: entry
                    .title
                    .map(|t| unescape_html(t.content.trim()))
                    .unwrap_or_default(),
                link: link.trim().to_string(),
                description: unescape_html(description.trim()),
                pub_date,
            }
        })
        .collect();

    Ok(FeedDocument {
        title: feed
            .title
            .map(|t| unescape_html(t.content.trim()))
            .unwrap_or_default(),
        description: feed
            .description
            .map(|t| unescape_html(t.content.trim()))
            .unwrap_or_default(),
        items,
    })
}
