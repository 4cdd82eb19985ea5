mod commands;
mod composer;
mod dom;
mod pathutil;

pub use commands::{
    Command, DumpAllImages, DumpMailMarkup, DumpStyleSheet, InsertAppMetadata, InsertMailHeader,
    RemoveAllJs, RemoveAllMetaTags, RemoveAllStyleSheet,
};
pub use composer::{ComposerPayload, MailComposer};
pub use pathutil::{naive_join, relative_href, render_mail_path, slugify};
