mod link;
mod node;
mod object;
