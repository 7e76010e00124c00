use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct BlobHeader {
    #[prost(string, required, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub indexdata: Option<Vec<u8>>,
    #[prost(int32, required, tag = "3")]
    pub datasize: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct Blob {
    /// Size of the payload after decompression.
    #[prost(int32, optional, tag = "2")]
    pub raw_size: Option<i32>,
    #[prost(oneof = "blob::Data", tags = "1, 3, 4, 5, 6, 7")]
    pub data: Option<blob::Data>,
}

pub mod blob {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(bytes, tag = "1")]
        Raw(Vec<u8>),
        #[prost(bytes, tag = "3")]
        ZlibData(Vec<u8>),
        #[prost(bytes, tag = "4")]
        LzmaData(Vec<u8>),
        #[prost(bytes, tag = "5")]
        ObsoleteBzip2Data(Vec<u8>),
        #[prost(bytes, tag = "6")]
        Lz4Data(Vec<u8>),
        #[prost(bytes, tag = "7")]
        ZstdData(Vec<u8>),
    }
}
