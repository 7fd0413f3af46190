mod url;

pub use url::{
    CreateUrlRequest, LinkChanges, LinkResponse, ListQuery, ShortenRow, ShortenedUrl,
    UpdateUrlRequest, TAG_SEPARATOR,
};
