//! Registry of mime types with compact single-byte codes.

use std::fmt;

macro_rules! well_known_mime_types {
    ($($variant:ident = $code:literal => $mime:literal,)+) => {
        /// Mime types that travel as a one-byte code in composite metadata.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub enum WellKnownMimeType {
            $($variant,)+
        }

        impl WellKnownMimeType {
            /// Every registered type in code order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// The 7-bit wire code.
            #[must_use]
            pub const fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// The textual mime type.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $mime,)+
                }
            }

            /// Look up a type by its wire code.
            ///
            /// Codes inside the reserved range that have no assignment yield
            /// `None`.
            #[must_use]
            pub const fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Look up a type by its exact textual form.
            #[must_use]
            pub fn from_mime(mime: &str) -> Option<Self> {
                match mime {
                    $($mime => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

well_known_mime_types! {
    ApplicationAvro = 0x00 => "application/avro",
    ApplicationCbor = 0x01 => "application/cbor",
    ApplicationGraphql = 0x02 => "application/graphql",
    ApplicationGzip = 0x03 => "application/gzip",
    ApplicationJavascript = 0x04 => "application/javascript",
    ApplicationJson = 0x05 => "application/json",
    ApplicationOctetStream = 0x06 => "application/octet-stream",
    ApplicationPdf = 0x07 => "application/pdf",
    ApplicationThrift = 0x08 => "application/vnd.apache.thrift.binary",
    ApplicationProtobuf = 0x09 => "application/vnd.google.protobuf",
    ApplicationXml = 0x0A => "application/xml",
    ApplicationZip = 0x0B => "application/zip",
    AudioAac = 0x0C => "audio/aac",
    AudioMp3 = 0x0D => "audio/mp3",
    AudioMp4 = 0x0E => "audio/mp4",
    AudioMpeg3 = 0x0F => "audio/mpeg3",
    AudioMpeg = 0x10 => "audio/mpeg",
    AudioOgg = 0x11 => "audio/ogg",
    AudioOpus = 0x12 => "audio/opus",
    AudioVorbis = 0x13 => "audio/vorbis",
    ImageBmp = 0x14 => "image/bmp",
    ImageGif = 0x15 => "image/gif",
    ImageHeicSequence = 0x16 => "image/heic-sequence",
    ImageHeic = 0x17 => "image/heic",
    ImageHeifSequence = 0x18 => "image/heif-sequence",
    ImageHeif = 0x19 => "image/heif",
    ImageJpeg = 0x1A => "image/jpeg",
    ImagePng = 0x1B => "image/png",
    ImageTiff = 0x1C => "image/tiff",
    MultipartMixed = 0x1D => "multipart/mixed",
    TextCss = 0x1E => "text/css",
    TextCsv = 0x1F => "text/csv",
    TextHtml = 0x20 => "text/html",
    TextPlain = 0x21 => "text/plain",
    TextXml = 0x22 => "text/xml",
    VideoH264 = 0x23 => "video/H264",
    VideoH265 = 0x24 => "video/H265",
    VideoVp8 = 0x25 => "video/VP8",
    Tags = 0x7B => "message/x.rsocket.tags.v0",
    Path = 0x7C => "message/x.rsocket.path.v0",
    Rpc = 0x7D => "message/x.rsocket.rpc.v0",
    TracingZipkin = 0x7E => "message/x.rsocket.tracing-zipkin.v0",
    CompositeMetadata = 0x7F => "message/x.rsocket.composite-metadata.v0",
}

impl fmt::Debug for WellKnownMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Display for WellKnownMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
