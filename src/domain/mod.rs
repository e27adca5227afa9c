// Domain layer - Core types shared by the decoder, player and transcoder

pub mod model;
