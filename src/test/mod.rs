mod queues;
mod routing_table;
mod tcp;
mod topologies;
mod tracer;
